// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimal ISO-10303-21 (STEP) scanner.
//!
//! Parses just enough of an IFC file for validation and lightweight
//! take-off: the header schema, the instance records with their ids,
//! types, and raw argument text, plus typed views over quantities,
//! cartesian points, and SI units.

use crate::mapping::QuantityKind;
use std::collections::HashMap;

/// One `#id=TYPE(args);` record from the DATA section.
#[derive(Clone, Debug, PartialEq)]
pub struct StepEntity {
    /// Numeric instance id.
    pub id: u64,
    /// Uppercased entity type, e.g. `IFCWALL`.
    pub ty: String,
    /// Raw argument text between the outer parentheses.
    pub args: String,
}

impl StepEntity {
    /// The first quoted argument, unescaped — for IFC-rooted entities this
    /// is the GlobalId.
    pub fn first_string_arg(&self) -> Option<String> {
        let args = split_top_level(&self.args);
        let first = args.first()?;
        parse_string(first)
    }

    /// Top-level arguments of the record.
    pub fn arg_list(&self) -> Vec<String> {
        split_top_level(&self.args)
    }
}

/// Parsed view of a STEP file.
#[derive(Clone, Debug, Default)]
pub struct StepModel {
    /// Schema names from `FILE_SCHEMA(('IFC4'))`.
    pub schemas: Vec<String>,
    /// All DATA-section records in file order.
    pub entities: Vec<StepEntity>,
    index: HashMap<String, Vec<usize>>,
}

impl StepModel {
    /// Parse the textual content of a STEP file.
    ///
    /// Records may span lines; everything up to the terminating `;` is one
    /// record. A file without the `ISO-10303-21` banner is rejected.
    pub fn parse(text: &str) -> Result<Self, String> {
        if !text.trim_start().starts_with("ISO-10303-21") {
            return Err("missing ISO-10303-21 banner".into());
        }

        let mut model = StepModel::default();
        for record in records(text) {
            let record = record.trim();
            if let Some(rest) = record.strip_prefix("FILE_SCHEMA") {
                for schema in rest
                    .split('\'')
                    .skip(1)
                    .step_by(2)
                    .map(|s| s.to_ascii_uppercase())
                {
                    model.schemas.push(schema);
                }
                continue;
            }
            if !record.starts_with('#') {
                continue;
            }
            let Some(eq) = record.find('=') else { continue };
            let Ok(id) = record[1..eq].trim().parse::<u64>() else {
                continue;
            };
            let body = record[eq + 1..].trim();
            let Some(open) = body.find('(') else { continue };
            let ty = body[..open].trim().to_ascii_uppercase();
            let close = body.rfind(')').unwrap_or(body.len());
            let args = body[open + 1..close].to_string();
            model
                .index
                .entry(ty.clone())
                .or_default()
                .push(model.entities.len());
            model.entities.push(StepEntity { id, ty, args });
        }
        Ok(model)
    }

    /// All instances of `ty` (uppercase).
    pub fn instances_of(&self, ty: &str) -> Vec<&StepEntity> {
        self.index
            .get(&ty.to_ascii_uppercase())
            .map(|ids| ids.iter().map(|&i| &self.entities[i]).collect())
            .unwrap_or_default()
    }

    /// `(name, value)` pairs of all quantity records of `kind`.
    pub fn quantities(&self, kind: QuantityKind) -> Vec<(String, f64)> {
        let ty = match kind {
            QuantityKind::Length => "IFCQUANTITYLENGTH",
            QuantityKind::Area => "IFCQUANTITYAREA",
            QuantityKind::Volume => "IFCQUANTITYVOLUME",
            QuantityKind::Count => "IFCQUANTITYCOUNT",
        };
        self.instances_of(ty)
            .into_iter()
            .filter_map(|e| {
                let args = e.arg_list();
                let name = args.first().and_then(|a| parse_string(a))?;
                // Name, Description, Unit precede the value; a formula may
                // follow it.
                let value = args
                    .iter()
                    .skip(3)
                    .find_map(|a| a.trim().parse::<f64>().ok())?;
                Some((name, value))
            })
            .collect()
    }

    /// Coordinates of every `IFCCARTESIANPOINT`.
    pub fn cartesian_points(&self) -> Vec<Vec<f64>> {
        self.instances_of("IFCCARTESIANPOINT")
            .into_iter()
            .filter_map(|e| {
                let inner = e.args.trim();
                let inner = inner.strip_prefix('(')?.strip_suffix(')')?;
                let coords: Vec<f64> = inner
                    .split(',')
                    .filter_map(|c| c.trim().parse::<f64>().ok())
                    .collect();
                (!coords.is_empty()).then_some(coords)
            })
            .collect()
    }

    /// GlobalIds of rooted entities (first quoted 22-character argument).
    pub fn global_ids(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter_map(|e| e.first_string_arg())
            .filter(|s| s.len() == 22)
            .collect()
    }

    /// Scale from model length units to millimetres, when an SI length
    /// unit is declared. `None` means the unit is not resolvable.
    pub fn length_unit_scale_mm(&self) -> Option<f64> {
        for unit in self.instances_of("IFCSIUNIT") {
            let args = unit.args.to_ascii_uppercase();
            if !args.contains(".LENGTHUNIT.") {
                continue;
            }
            if args.contains(".MILLI.") {
                return Some(1.0);
            }
            if args.contains(".CENTI.") {
                return Some(10.0);
            }
            // Unprefixed metre.
            if args.contains(".METRE.") {
                return Some(1000.0);
            }
        }
        None
    }
}

/// Iterate `;`-terminated records, honoring quoted strings.
fn records(text: &str) -> impl Iterator<Item = String> + '_ {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for ch in text.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                current.push(ch);
            }
            ';' if !in_string => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    out.into_iter()
}

/// Split argument text on top-level commas (outside parens and strings).
fn split_top_level(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut current = String::new();
    for ch in args.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                current.push(ch);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if !in_string && depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() || !out.is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// Unquote a STEP string literal.
fn parse_string(arg: &str) -> Option<String> {
    let arg = arg.trim();
    let inner = arg.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}
