//! View-level configuration shared with the host as `canvas_spec`.

use crate::channel::{SyncError, SyncValue, Syncable};
use canvas_columnar::Table;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of instance each table row describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CanvasDataType {
    #[default]
    Tabular = 1,
    Image = 2,
    Audio = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownDataType(pub u8);

impl fmt::Display for UnknownDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown canvas data type {}", self.0)
    }
}

impl std::error::Error for UnknownDataType {}

impl TryFrom<u8> for CanvasDataType {
    type Error = UnknownDataType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CanvasDataType::Tabular),
            2 => Ok(CanvasDataType::Image),
            3 => Ok(CanvasDataType::Audio),
            other => Err(UnknownDataType(other)),
        }
    }
}

impl From<CanvasDataType> for u8 {
    fn from(value: CanvasDataType) -> Self {
        value as u8
    }
}

const AUDIO_EXTENSIONS: &[&str] = &["wav"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "bmp", "jpeg", "tif", "tiff"];

impl CanvasDataType {
    /// An explicit type wins; otherwise the type is guessed from the suffix of the first id.
    pub fn infer(explicit: Option<CanvasDataType>, first_id: &str) -> Self {
        if let Some(data_type) = explicit {
            return data_type;
        }
        if AUDIO_EXTENSIONS.iter().any(|ext| first_id.ends_with(ext)) {
            CanvasDataType::Audio
        } else if IMAGE_EXTENSIONS.iter().any(|ext| first_id.ends_with(ext)) {
            CanvasDataType::Image
        } else {
            CanvasDataType::Tabular
        }
    }

    pub fn default_instances_per_page(self) -> u32 {
        match self {
            CanvasDataType::Audio => 20,
            CanvasDataType::Image => 40,
            CanvasDataType::Tabular => 150,
        }
    }
}

/// `explicit` when given (and non-zero), else the default page size for `data_type`.
pub fn default_instances_per_page(explicit: Option<u32>, data_type: CanvasDataType) -> u32 {
    explicit
        .filter(|&n| n > 0)
        .unwrap_or_else(|| data_type.default_instances_per_page())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasSpec {
    pub files_path: String,
    pub data_type: CanvasDataType,
    pub instances_per_page: u32,
    pub show_unfiltered_data: bool,
    pub id_column: String,
}

impl Default for CanvasSpec {
    fn default() -> Self {
        Self {
            files_path: String::new(),
            data_type: CanvasDataType::Tabular,
            instances_per_page: CanvasDataType::Tabular.default_instances_per_page(),
            show_unfiltered_data: true,
            id_column: "id".to_owned(),
        }
    }
}

impl CanvasSpec {
    /// Build the spec for a table: tabular when `id_column` is absent, otherwise inferred from the
    /// first id.
    pub fn for_table(
        table: &Table,
        id_column: &str,
        data_type: Option<CanvasDataType>,
        instances_per_page: Option<u32>,
    ) -> Self {
        let data_type = match table.get(0, id_column) {
            None => CanvasDataType::Tabular,
            Some(first_id) => CanvasDataType::infer(data_type, &first_id.to_string()),
        };
        Self {
            data_type,
            instances_per_page: default_instances_per_page(instances_per_page, data_type),
            id_column: id_column.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_files_path(mut self, files_path: impl Into<String>) -> Self {
        self.files_path = files_path.into();
        self
    }
}

impl Syncable for CanvasSpec {
    fn to_sync(&self) -> Result<SyncValue, SyncError> {
        Ok(SyncValue::Json(serde_json::to_value(self)?))
    }

    fn from_sync(value: &SyncValue) -> Result<Option<Self>, SyncError> {
        match value {
            SyncValue::Json(serde_json::Value::Null) => Ok(None),
            SyncValue::Json(json) => Ok(Some(serde_json::from_value(json.clone())?)),
            SyncValue::Bytes(_) => Err(SyncError::UnexpectedValue {
                expected: "a canvas spec object",
                actual: "bytes".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_columnar::{Column, Value};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn infers_type_from_id_suffix() {
        assert_eq!(CanvasDataType::infer(None, "clip_01.wav"), CanvasDataType::Audio);
        assert_eq!(CanvasDataType::infer(None, "cat.jpeg"), CanvasDataType::Image);
        assert_eq!(CanvasDataType::infer(None, "scan.tiff"), CanvasDataType::Image);
        assert_eq!(CanvasDataType::infer(None, "row-17"), CanvasDataType::Tabular);
        assert_eq!(
            CanvasDataType::infer(Some(CanvasDataType::Tabular), "cat.png"),
            CanvasDataType::Tabular
        );
    }

    #[test]
    fn page_size_defaults_by_type() {
        assert_eq!(default_instances_per_page(None, CanvasDataType::Audio), 20);
        assert_eq!(default_instances_per_page(None, CanvasDataType::Image), 40);
        assert_eq!(default_instances_per_page(Some(0), CanvasDataType::Tabular), 150);
        assert_eq!(default_instances_per_page(Some(12), CanvasDataType::Image), 12);
    }

    #[test]
    fn for_table_falls_back_to_tabular_without_ids() {
        let table = Table::from_columns(vec![Column::new(
            "id",
            vec![Value::from("a.png"), Value::from("b.png")],
        )])
        .unwrap();
        let spec = CanvasSpec::for_table(&table, "id", None, None);
        assert_eq!(spec.data_type, CanvasDataType::Image);
        assert_eq!(spec.instances_per_page, 40);

        let spec = CanvasSpec::for_table(&table, "file", None, None);
        assert_eq!(spec.data_type, CanvasDataType::Tabular);
        assert_eq!(spec.id_column, "file");
    }

    #[test]
    fn wire_format_is_camel_case() {
        let spec = CanvasSpec::default().with_files_path("/data");
        let SyncValue::Json(json) = spec.to_sync().unwrap() else {
            panic!("canvas spec must sync as JSON");
        };
        assert_eq!(
            json,
            json!({
                "filesPath": "/data",
                "dataType": 1,
                "instancesPerPage": 150,
                "showUnfilteredData": true,
                "idColumn": "id"
            })
        );
        let back = CanvasSpec::from_sync(&SyncValue::Json(json!({"dataType": 3}))).unwrap();
        assert_eq!(back.map(|s| s.data_type), Some(CanvasDataType::Audio));
        assert!(CanvasSpec::from_sync(&SyncValue::Json(json!({"dataType": 9}))).is_err());
    }
}
