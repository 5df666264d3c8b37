// SPDX-License-Identifier: MIT OR Apache-2.0
//! IFC engine over the STEP scanner.
//!
//! For every mapped entity class the engine produces one row: count-class
//! mappings count instances; length/area/volume mappings sum the matching
//! `IFCQUANTITY*` records (filtered by `quantity_name` when configured),
//! falling back to the instance count when the model carries no quantity
//! records at all. Rows sharing (code, description, unit) are merged.

use crate::mapping::QuantityKind;
use crate::{BoqRow, ExtractError, ExtractRequest, ExtractResult, Extractor};
use crate::step::StepModel;
use std::collections::BTreeMap;
use tracing::debug;

/// Extractor for IFC inputs.
pub struct IfcExtractor;

impl Extractor for IfcExtractor {
    fn extract(&self, req: &ExtractRequest<'_>) -> ExtractResult<Vec<BoqRow>> {
        let text = std::fs::read_to_string(req.path)?;
        let model = StepModel::parse(&text).map_err(ExtractError::Parse)?;

        // Classes sharing (code, description, unit) form one row; their
        // quantity is computed once per group so sum-kind records are never
        // counted twice.
        struct Group {
            entry: crate::mapping::IfcMapEntry,
            classes: Vec<String>,
            instances: usize,
        }
        let mut groups: BTreeMap<(String, String, String), Group> = BTreeMap::new();

        for (class, entry) in &req.mapping.ifc {
            let instances = model.instances_of(class).len();
            if instances == 0 {
                continue;
            }
            let key = (
                entry.code.clone().unwrap_or_default(),
                entry.description.clone(),
                entry.unit.clone(),
            );
            let group = groups.entry(key).or_insert_with(|| Group {
                entry: entry.clone(),
                classes: Vec::new(),
                instances: 0,
            });
            group.classes.push(class.clone());
            group.instances += instances;
        }

        Ok(groups
            .into_iter()
            .map(|((code, description, unit), group)| {
                let qty = match group.entry.quantity {
                    QuantityKind::Count => group.instances as f64,
                    kind => {
                        let matching: Vec<f64> = model
                            .quantities(kind)
                            .into_iter()
                            .filter(|(name, _)| match &group.entry.quantity_name {
                                Some(wanted) => name.eq_ignore_ascii_case(wanted),
                                None => true,
                            })
                            .map(|(_, v)| v)
                            .collect();
                        if matching.is_empty() {
                            debug!(
                                classes = %group.classes.join("+"),
                                "no quantity records; falling back to instance count"
                            );
                            group.instances as f64
                        } else {
                            matching.iter().sum()
                        }
                    }
                };
                BoqRow::new(
                    (!code.is_empty()).then_some(code),
                    description,
                    unit,
                    qty,
                    Some(group.classes.join("+")),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingConfig;
    use qto_core::FileType;
    use std::io::Write as _;

    const MODEL: &str = r#"ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCWALL('0DWgwt6o1FOx7466fPk$jl',$,'Wall A');
#2=IFCWALLSTANDARDCASE('1kTvXnbbzCWw8lcMd1dR4o',$,'Wall B');
#3=IFCDOOR('2hWvXnbbzCWw8lcMd1dR4p',$,'Door 1');
#4=IFCDOOR('3hWvXnbbzCWw8lcMd1dR4q',$,'Door 2');
#5=IFCQUANTITYAREA('NetSideArea',$,$,12.5);
#6=IFCQUANTITYAREA('NetSideArea',$,$,14.25);
ENDSEC;
END-ISO-10303-21;
"#;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn extract(model: &str) -> Vec<BoqRow> {
        let file = write_temp(model);
        let mapping = MappingConfig::default();
        let req = ExtractRequest {
            file_type: FileType::Ifc,
            path: file.path(),
            mapping: &mapping,
        };
        IfcExtractor.extract(&req).unwrap()
    }

    #[test]
    fn counts_doors_and_sums_wall_areas() {
        let rows = extract(MODEL);

        let doors = rows.iter().find(|r| r.description == "Doors").unwrap();
        assert_eq!(doors.qty, 2.0);
        assert_eq!(doors.unit, "pcs");

        // IFCWALL and IFCWALLSTANDARDCASE merge into one Walls row whose
        // area is the sum of the model's area records, counted once.
        let walls = rows.iter().find(|r| r.description == "Walls").unwrap();
        assert_eq!(walls.unit, "m2");
        assert_eq!(walls.qty, 12.5 + 14.25);
        assert!(walls.source_ref.as_deref().unwrap().contains("IFCWALL"));
    }

    #[test]
    fn falls_back_to_instance_count_without_quantities() {
        let model = r#"ISO-10303-21;
DATA;
#1=IFCSLAB('4hWvXnbbzCWw8lcMd1dR4r',$,'Slab');
ENDSEC;
"#;
        let rows = extract(model);
        let slabs = rows.iter().find(|r| r.description == "Slabs").unwrap();
        assert_eq!(slabs.qty, 1.0);
    }

    #[test]
    fn unmapped_classes_ignored() {
        let model = r#"ISO-10303-21;
DATA;
#1=IFCFLOWTERMINAL('5hWvXnbbzCWw8lcMd1dR4s',$,'Sink');
ENDSEC;
"#;
        assert!(extract(model).is_empty());
    }

    #[test]
    fn broken_model_is_parse_error() {
        let file = write_temp("not a step file");
        let mapping = MappingConfig::default();
        let req = ExtractRequest {
            file_type: FileType::Ifc,
            path: file.path(),
            mapping: &mapping,
        };
        assert!(matches!(
            IfcExtractor.extract(&req),
            Err(ExtractError::Parse(_))
        ));
    }
}
