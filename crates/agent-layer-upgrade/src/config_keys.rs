use agent_layer_core::{ConfigKeyMigration, MigrationKind};
use agent_layer_templates::{MigrationOperation, ValueType};
use anyhow::{anyhow, Context, Result};
use toml_edit::{DocumentMut, Item, TableLike};

pub fn parse_config(raw: &str) -> Result<toml::Table> {
    toml::from_str(raw).context("invalid config TOML")
}

fn segments(key: &str) -> Vec<&str> {
    key.split('.').collect()
}

pub fn lookup_key<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let segments = segments(key);
    let (last, parents) = segments.split_last()?;
    let mut current = table;
    for segment in parents {
        current = current.get(*segment)?.as_table()?;
    }
    current.get(*last)
}

fn remove_key(table: &mut toml::Table, key: &str) -> Option<toml::Value> {
    let segments = segments(key);
    let (last, parents) = segments.split_last()?;
    let mut current = table;
    for segment in parents {
        current = current.get_mut(*segment)?.as_table_mut()?;
    }
    current.remove(*last)
}

fn insert_key(table: &mut toml::Table, key: &str, value: toml::Value) -> bool {
    let segments = segments(key);
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        let Some(next) = entry.as_table_mut() else {
            return false;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
    true
}

pub(crate) fn to_json(value: &toml::Value) -> Option<serde_json::Value> {
    Some(match value {
        toml::Value::String(raw) => serde_json::Value::String(raw.clone()),
        toml::Value::Integer(number) => serde_json::Value::from(*number),
        toml::Value::Float(number) => {
            serde_json::Value::Number(serde_json::Number::from_f64(*number)?)
        }
        toml::Value::Boolean(flag) => serde_json::Value::Bool(*flag),
        toml::Value::Datetime(datetime) => serde_json::Value::String(datetime.to_string()),
        toml::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(to_json).collect::<Option<Vec<_>>>()?,
        ),
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(key, value)| to_json(value).map(|value| (key.clone(), value)))
                .collect::<Option<serde_json::Map<_, _>>>()?,
        ),
    })
}

fn from_json(value: &serde_json::Value) -> Option<toml::Value> {
    match value {
        serde_json::Value::Bool(flag) => Some(toml::Value::Boolean(*flag)),
        serde_json::Value::Number(number) => number
            .as_i64()
            .map(toml::Value::Integer)
            .or_else(|| number.as_f64().map(toml::Value::Float)),
        serde_json::Value::String(raw) => Some(toml::Value::String(raw.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(from_json)
            .collect::<Option<Vec<_>>>()
            .map(toml::Value::Array),
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}

pub(crate) fn has_type(value: &toml::Value, value_type: ValueType) -> bool {
    match value_type {
        ValueType::Bool => value.is_bool(),
        ValueType::String => value.is_str(),
        ValueType::Integer => value.is_integer(),
        ValueType::StringList => value
            .as_array()
            .is_some_and(|items| items.iter().all(toml::Value::is_str)),
    }
}

/// Converts `value` to `to`. `None` when no lossless conversion exists.
pub fn convert_value(value: &toml::Value, to: ValueType) -> Option<toml::Value> {
    if has_type(value, to) {
        return Some(value.clone());
    }
    match (to, value) {
        (ValueType::Bool, toml::Value::String(raw)) => {
            match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(toml::Value::Boolean(true)),
                "false" | "no" | "off" | "0" => Some(toml::Value::Boolean(false)),
                _ => None,
            }
        }
        (ValueType::Bool, toml::Value::Integer(0)) => Some(toml::Value::Boolean(false)),
        (ValueType::Bool, toml::Value::Integer(1)) => Some(toml::Value::Boolean(true)),
        (ValueType::String, toml::Value::Boolean(flag)) => {
            Some(toml::Value::String(flag.to_string()))
        }
        (ValueType::String, toml::Value::Integer(number)) => {
            Some(toml::Value::String(number.to_string()))
        }
        (ValueType::String, toml::Value::Float(number)) => {
            Some(toml::Value::String(number.to_string()))
        }
        (ValueType::Integer, toml::Value::String(raw)) => {
            raw.trim().parse::<i64>().ok().map(toml::Value::Integer)
        }
        (ValueType::Integer, toml::Value::Float(number))
            if number.fract() == 0.0 && number.is_finite() =>
        {
            Some(toml::Value::Integer(*number as i64))
        }
        (ValueType::StringList, toml::Value::String(raw)) => Some(toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| toml::Value::String(item.to_string()))
                .collect(),
        )),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEdit {
    RenameKey { from: String, to: String },
    SetDefault { key: String, value: serde_json::Value },
    RetypeKey { key: String, to_type: ValueType },
}

impl ConfigEdit {
    pub fn from_operation(operation: &MigrationOperation) -> Option<Self> {
        match operation.kind {
            MigrationKind::ConfigRenameKey => Some(Self::RenameKey {
                from: operation.from.clone()?,
                to: operation.to.clone()?,
            }),
            MigrationKind::ConfigSetDefault => Some(Self::SetDefault {
                key: operation.key.clone()?,
                value: operation.value.clone()?,
            }),
            MigrationKind::ConfigRetypeKey => Some(Self::RetypeKey {
                key: operation.key.clone()?,
                to_type: operation.to_type?,
            }),
            MigrationKind::RenameFile
            | MigrationKind::DeleteFile
            | MigrationKind::DeleteGeneratedArtifact => None,
        }
    }

    pub(crate) fn simulate(&self, table: &mut toml::Table) -> Vec<ConfigKeyMigration> {
        match self {
            Self::RenameKey { from, to } => {
                let Some(value) = remove_key(table, from) else {
                    return Vec::new();
                };
                let json = to_json(&value);
                insert_key(table, to, value);
                vec![
                    ConfigKeyMigration {
                        key: from.clone(),
                        from: json.clone(),
                        to: None,
                    },
                    ConfigKeyMigration {
                        key: to.clone(),
                        from: None,
                        to: json,
                    },
                ]
            }
            Self::SetDefault { key, value } => {
                let Some(converted) = from_json(value) else {
                    return Vec::new();
                };
                insert_key(table, key, converted);
                vec![ConfigKeyMigration {
                    key: key.clone(),
                    from: None,
                    to: Some(value.clone()),
                }]
            }
            Self::RetypeKey { key, to_type } => {
                let Some(current) = lookup_key(table, key).cloned() else {
                    return Vec::new();
                };
                let Some(converted) = convert_value(&current, *to_type) else {
                    return Vec::new();
                };
                let row = ConfigKeyMigration {
                    key: key.clone(),
                    from: to_json(&current),
                    to: to_json(&converted),
                };
                insert_key(table, key, converted);
                vec![row]
            }
        }
    }
}

pub fn plan_config_key_migrations(
    config: Option<&toml::Table>,
    operations: &[MigrationOperation],
) -> Vec<ConfigKeyMigration> {
    let Some(config) = config else {
        return Vec::new();
    };
    let mut working = config.clone();
    operations
        .iter()
        .filter_map(ConfigEdit::from_operation)
        .flat_map(|edit| edit.simulate(&mut working))
        .collect()
}

fn table_mut<'a>(
    document: &'a mut DocumentMut,
    segments: &[&str],
    create: bool,
) -> Option<&'a mut dyn TableLike> {
    let mut current: &mut dyn TableLike = document.as_table_mut();
    for segment in segments {
        if create && !current.contains_key(segment) {
            current.insert(segment, Item::Table(toml_edit::Table::new()));
        }
        current = current.get_mut(segment)?.as_table_like_mut()?;
    }
    Some(current)
}

fn edit_value(value: &toml::Value) -> Option<toml_edit::Value> {
    Some(match value {
        toml::Value::String(raw) => toml_edit::Value::from(raw.as_str()),
        toml::Value::Integer(number) => toml_edit::Value::from(*number),
        toml::Value::Float(number) => toml_edit::Value::from(*number),
        toml::Value::Boolean(flag) => toml_edit::Value::from(*flag),
        toml::Value::Array(items) => {
            let mut array = toml_edit::Array::new();
            for item in items {
                array.push(edit_value(item)?);
            }
            toml_edit::Value::Array(array)
        }
        toml::Value::Datetime(_) | toml::Value::Table(_) => return None,
    })
}

/// Applies `edits` to the raw config text, keeping comments and formatting of
/// everything the edits do not touch.
pub fn apply_config_edits(raw: &str, edits: &[ConfigEdit]) -> Result<String> {
    let mut document: DocumentMut = raw.parse().context("invalid config TOML")?;
    let mut parsed = parse_config(raw)?;

    for edit in edits {
        match edit {
            ConfigEdit::RenameKey { from, to } => {
                let from_segments = segments(from);
                let Some((from_last, from_parents)) = from_segments.split_last() else {
                    continue;
                };
                let Some(item) = table_mut(&mut document, from_parents, false)
                    .and_then(|table| table.remove(from_last))
                else {
                    continue;
                };
                let to_segments = segments(to);
                let (to_last, to_parents) = to_segments
                    .split_last()
                    .ok_or_else(|| anyhow!("config key '{to}' is empty"))?;
                let parent = table_mut(&mut document, to_parents, true).ok_or_else(|| {
                    anyhow!("cannot rename config key '{from}' to '{to}': parent is not a table")
                })?;
                parent.insert(to_last, item);
            }
            ConfigEdit::SetDefault { key, value } => {
                let converted = from_json(value)
                    .and_then(|value| edit_value(&value))
                    .ok_or_else(|| anyhow!("unsupported default value for config key '{key}'"))?;
                let key_segments = segments(key);
                let (last, parents) = key_segments
                    .split_last()
                    .ok_or_else(|| anyhow!("config key is empty"))?;
                let parent = table_mut(&mut document, parents, true).ok_or_else(|| {
                    anyhow!("cannot set config key '{key}': parent is not a table")
                })?;
                if !parent.contains_key(last) {
                    parent.insert(last, Item::Value(converted));
                }
            }
            ConfigEdit::RetypeKey { key, to_type } => {
                let Some(current) = lookup_key(&parsed, key) else {
                    continue;
                };
                let converted = convert_value(current, *to_type)
                    .and_then(|value| edit_value(&value))
                    .ok_or_else(|| {
                        anyhow!(
                            "cannot convert config key '{key}' to {}",
                            to_type.as_str()
                        )
                    })?;
                let key_segments = segments(key);
                let (last, parents) = key_segments
                    .split_last()
                    .ok_or_else(|| anyhow!("config key is empty"))?;
                let Some(item) =
                    table_mut(&mut document, parents, false).and_then(|table| table.get_mut(last))
                else {
                    continue;
                };
                let mut replacement = converted;
                if let Some(existing) = item.as_value() {
                    *replacement.decor_mut() = existing.decor().clone();
                }
                *item = Item::Value(replacement);
            }
        }
        edit.simulate(&mut parsed);
    }

    Ok(document.to_string())
}
