use pasarport_core::{TargetColumnInfo, TargetSchema};

use super::queries::RawColumn;

pub fn map_column(raw: RawColumn) -> (String, TargetColumnInfo) {
    let mut column = TargetColumnInfo::new(raw.name, &raw.data_type, &raw.column_type);
    if !raw.is_nullable {
        column = column.not_null();
    }
    if let Some(default) = raw.default {
        column = column.with_default(default);
    }
    if let Some(length) = raw
        .character_max_length
        .filter(|length| *length > 0)
        .and_then(|length| usize::try_from(length).ok())
    {
        column = column.with_max_length(length);
    }
    if raw.is_auto_increment {
        column = column.auto_increment();
    }
    (raw.table_name, column)
}

pub fn map_schema(raw: Vec<RawColumn>) -> TargetSchema {
    let mut schema = TargetSchema::new();
    for column in raw {
        let (table, column) = map_column(column);
        schema.insert_column(&table, column);
    }
    schema
}
