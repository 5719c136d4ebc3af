//! Tests for bulk transfer column resolution

use crate::bulk::*;
use sqltask_core::{BulkCopyFlags, BulkLoadPlan, ColumnMapping, ColumnMappings, SqlDbType, Value};
use tiberius::ColumnData;

fn items_table() -> Vec<DestinationColumn> {
    let mut id = DestinationColumn::new("id", "int");
    id.is_identity = true;
    let name = DestinationColumn::new("name", "nvarchar");
    let mut price = DestinationColumn::new("price", "decimal");
    price.scale = 2;
    let mut total = DestinationColumn::new("total", "decimal");
    total.is_computed = true;
    let version = DestinationColumn::new("version", "timestamp");
    vec![id, name, price, total, version]
}

fn plan(source_columns: &[&str], mappings: ColumnMappings) -> BulkLoadPlan {
    BulkLoadPlan {
        table: "dbo.Items".into(),
        source_columns: source_columns.iter().map(|c| c.to_string()).collect(),
        rows: vec![],
        mappings,
        flags: BulkCopyFlags::default(),
        notify_after: 0,
    }
}

fn bound_names(bound: &[BoundColumn]) -> Vec<(&str, Option<usize>)> {
    bound
        .iter()
        .map(|b| (b.column.name.as_str(), b.source))
        .collect()
}

mod resolve_tests {
    use super::*;

    #[test]
    fn test_positional_skips_identity_computed_and_rowversion() {
        let bound = resolve_columns(&plan(&["n", "p"], ColumnMappings::Positional), items_table()).unwrap();
        assert_eq!(bound_names(&bound), vec![("name", Some(0)), ("price", Some(1))]);
    }

    #[test]
    fn test_positional_with_keep_identity_includes_identity() {
        let mut p = plan(&["i", "n"], ColumnMappings::Positional);
        p.flags.keep_identity = true;
        let bound = resolve_columns(&p, items_table()).unwrap();
        assert_eq!(
            bound_names(&bound),
            vec![("id", Some(0)), ("name", Some(1)), ("price", None)]
        );
    }

    #[test]
    fn test_positional_rejects_extra_source_columns() {
        let err = resolve_columns(&plan(&["a", "b", "c"], ColumnMappings::Positional), items_table())
            .unwrap_err();
        assert!(err.to_string().contains("only 2 writable columns"));
    }

    #[test]
    fn test_explicit_mapping() {
        let mappings = ColumnMappings::Explicit(vec![
            ColumnMapping::new("Cost", "price"),
            ColumnMapping::new("Label", "name"),
        ]);
        let bound = resolve_columns(&plan(&["Label", "Cost", "Unused"], mappings), items_table()).unwrap();
        assert_eq!(bound_names(&bound), vec![("name", Some(0)), ("price", Some(1))]);
    }

    #[test]
    fn test_explicit_mapping_to_missing_column() {
        let mappings = ColumnMappings::Explicit(vec![ColumnMapping::new("Label", "title")]);
        let err = resolve_columns(&plan(&["Label"], mappings), items_table()).unwrap_err();
        assert!(err.to_string().contains("'title'"));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_explicit_mapping_to_computed_column() {
        let mappings = ColumnMappings::Explicit(vec![ColumnMapping::new("Label", "total")]);
        let err = resolve_columns(&plan(&["Label"], mappings), items_table()).unwrap_err();
        assert!(err.to_string().contains("cannot be written"));
    }

    #[test]
    fn test_explicit_mapping_is_case_sensitive() {
        let mappings = ColumnMappings::Explicit(vec![ColumnMapping::new("label", "name")]);
        let err = resolve_columns(&plan(&["Label"], mappings), items_table()).unwrap_err();
        assert!(err.to_string().contains("'label'"));
    }

    #[test]
    fn test_explicit_mapping_twice_to_one_column() {
        let mappings = ColumnMappings::Explicit(vec![
            ColumnMapping::new("a", "name"),
            ColumnMapping::new("b", "name"),
        ]);
        let err = resolve_columns(&plan(&["a", "b"], mappings), items_table()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}

mod protocol_tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_full_mapping_with_default_flags_uses_bulk_protocol() {
        let p = plan(&["n", "p"], ColumnMappings::Positional);
        let bound = resolve_columns(&p, items_table()).unwrap();
        assert!(uses_bulk_protocol(&p, &bound));
    }

    #[test]
    fn test_partial_mapping_inserts_rows() {
        let p = plan(&["n"], ColumnMappings::Positional);
        let bound = resolve_columns(&p, items_table()).unwrap();
        assert!(!uses_bulk_protocol(&p, &bound));
    }

    #[test]
    fn test_flags_insert_rows() {
        let mut p = plan(&["n", "p"], ColumnMappings::Positional);
        p.flags.table_lock = true;
        let bound = resolve_columns(&p, items_table()).unwrap();
        assert!(!uses_bulk_protocol(&p, &bound));
    }

    #[test]
    fn test_default_flags_stream_rows() {
        let p = plan(&["n", "p"], ColumnMappings::Positional);
        let bound = resolve_columns(&p, items_table()).unwrap();
        assert_eq!(transfer_path(&p, &bound), TransferPath::BulkProtocol);
    }

    #[test]
    fn test_row_inserts_suppress_triggers_unless_asked() {
        let mut p = plan(&["n", "p"], ColumnMappings::Positional);
        p.flags.table_lock = true;
        let bound = resolve_columns(&p, items_table()).unwrap();
        assert_eq!(
            transfer_path(&p, &bound),
            TransferPath::RowInserts {
                suppress_triggers: true
            }
        );

        p.flags.fire_triggers = true;
        assert_eq!(
            transfer_path(&p, &bound),
            TransferPath::RowInserts {
                suppress_triggers: false
            }
        );
    }

    #[test]
    fn test_partial_mapping_suppresses_triggers() {
        let p = plan(&["n"], ColumnMappings::Positional);
        let bound = resolve_columns(&p, items_table()).unwrap();
        assert_eq!(
            transfer_path(&p, &bound),
            TransferPath::RowInserts {
                suppress_triggers: true
            }
        );
    }

    #[rstest]
    #[case("geography")]
    #[case("geometry")]
    #[case("HierarchyId")]
    fn test_clr_type_column_inserts_rows(#[case] type_name: &str) {
        let columns = vec![
            DestinationColumn::new("name", "nvarchar"),
            DestinationColumn::new("location", type_name),
        ];
        let p = plan(&["n", "l"], ColumnMappings::Positional);
        let bound = resolve_columns(&p, columns).unwrap();

        assert!(!uses_bulk_protocol(&p, &bound));
        assert_eq!(
            transfer_path(&p, &bound),
            TransferPath::RowInserts {
                suppress_triggers: true
            }
        );
    }
}

mod column_data_tests {
    use super::*;

    #[test]
    fn test_decimal_uses_column_scale() {
        let mut price = DestinationColumn::new("price", "decimal");
        price.scale = 2;
        match bulk_column_data(&price, Value::String("19.9".into())).unwrap() {
            ColumnData::Numeric(Some(n)) => {
                assert_eq!(n.value(), 1990);
                assert_eq!(n.scale(), 2);
            }
            other => panic!("expected numeric, got {:?}", other),
        }
    }

    #[test]
    fn test_value_is_coerced_to_column_type() {
        let qty = DestinationColumn::new("qty", "smallint");
        assert_eq!(qty.db_type, Some(SqlDbType::SmallInt));
        assert_eq!(
            bulk_column_data(&qty, Value::Int64(12)).unwrap(),
            ColumnData::I16(Some(12))
        );
    }

    #[test]
    fn test_null_is_typed_by_column() {
        let qty = DestinationColumn::new("qty", "bigint");
        assert_eq!(bulk_column_data(&qty, Value::Null).unwrap(), ColumnData::I64(None));
    }

    #[test]
    fn test_unconvertible_value_names_column() {
        let qty = DestinationColumn::new("qty", "int");
        let err = bulk_column_data(&qty, Value::String("many".into())).unwrap_err();
        assert!(err.to_string().contains("column 'qty'"));
    }

    #[test]
    fn test_unknown_type_passes_value_through() {
        let variant = DestinationColumn::new("payload", "sql_variant");
        assert_eq!(variant.db_type, None);
        assert_eq!(
            bulk_column_data(&variant, Value::Int32(5)).unwrap(),
            ColumnData::I32(Some(5))
        );
    }
}
