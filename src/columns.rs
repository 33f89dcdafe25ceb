use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, trace};

use crate::domain::PTVError;
use crate::record::Field;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    None,
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_active(&self) -> bool {
        *self != SortDirection::None
    }

    /// Header click semantics: anything but ascending becomes ascending.
    pub fn toggled(&self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc | SortDirection::None => SortDirection::Asc,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            "" | "none" => Some(SortDirection::None),
            _ => None,
        }
    }

    pub fn indicator(&self) -> &'static str {
        match self {
            SortDirection::None => "",
            SortDirection::Asc => "▲",
            SortDirection::Desc => "▼",
        }
    }
}

fn visible_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub key: Field,
    pub label: String,
    #[serde(default = "visible_default")]
    pub visible: bool,
    #[serde(default)]
    pub sort: SortDirection,
    #[serde(default)]
    pub filter: String,
}

impl ColumnDescriptor {
    pub fn new(key: Field, label: &str) -> Self {
        Self {
            key,
            label: label.to_string(),
            visible: true,
            sort: SortDirection::None,
            filter: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFilter {
    pub field: Field,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: Field,
    pub direction: SortDirection,
}

#[derive(Deserialize)]
struct ColumnsFile {
    columns: Vec<ColumnDescriptor>,
}

/// Ordered column configuration plus the per-column runtime state (visibility, sort, filter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnDescriptor>", into = "Vec<ColumnDescriptor>")]
pub struct ColumnRegistry {
    columns: Vec<ColumnDescriptor>,
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnDescriptor::new(Field::MnnId, "Ідентифікатор МНН"),
                ColumnDescriptor::new(Field::Subtype, "Піднапрям"),
                ColumnDescriptor::new(Field::Num, "№ позиції номенклатури"),
                ColumnDescriptor::new(Field::Name, "МНН"),
                ColumnDescriptor::new(Field::ReleaseForm, "Форма випуску"),
                ColumnDescriptor::new(Field::Dosage, "Дозування"),
                ColumnDescriptor::new(Field::Unit, "Одиниці виміру"),
            ],
        }
    }
}

impl TryFrom<Vec<ColumnDescriptor>> for ColumnRegistry {
    type Error = PTVError;

    fn try_from(columns: Vec<ColumnDescriptor>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl From<ColumnRegistry> for Vec<ColumnDescriptor> {
    fn from(registry: ColumnRegistry) -> Self {
        registry.columns
    }
}

impl ColumnRegistry {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Result<Self, PTVError> {
        let mut seen = HashSet::new();
        for c in columns.iter() {
            if !seen.insert(c.key) {
                return Err(PTVError::Config(format!("column {} is configured twice", c.key)));
            }
        }
        if columns.is_empty() {
            return Err(PTVError::Config("no columns configured".into()));
        }
        Ok(Self { columns })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PTVError> {
        let file: ColumnsFile = toml::from_str(content)?;
        Self::new(file.columns)
    }

    pub fn load(path: &Path) -> Result<Self, PTVError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PTVError::FileNotFound,
            ErrorKind::PermissionDenied => PTVError::PermissionDenied,
            _ => PTVError::IoError(e),
        })?;
        let registry = Self::from_toml_str(&content)?;
        debug!(
            "Loaded {} columns from {}",
            registry.columns.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, field: Field) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.key == field)
    }

    fn get_mut(&mut self, field: Field) -> Option<&mut ColumnDescriptor> {
        self.columns.iter_mut().find(|c| c.key == field)
    }

    /// All configured keys in registry order, visible or not.
    pub fn keys(&self) -> Vec<Field> {
        self.columns.iter().map(|c| c.key).collect()
    }

    pub fn visible(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.visible).collect()
    }

    pub fn has_visible(&self) -> bool {
        self.columns.iter().any(|c| c.visible)
    }

    pub fn is_visible(&self, field: Field) -> bool {
        self.get(field).map(|c| c.visible).unwrap_or(false)
    }

    pub fn toggle_visibility(&mut self, field: Field) {
        if let Some(column) = self.get_mut(field) {
            column.visible = !column.visible;
            trace!("Column {} visible: {}", field, column.visible);
        }
    }

    pub fn set_filter(&mut self, field: Field, text: &str) {
        if let Some(column) = self.get_mut(field) {
            column.filter = text.trim().to_string();
        }
    }

    pub fn clear_filters(&mut self) {
        for column in self.columns.iter_mut() {
            column.filter.clear();
        }
    }

    pub fn toggle_sort(&mut self, field: Field) {
        if let Some(column) = self.get_mut(field) {
            column.sort = column.sort.toggled();
        }
    }

    pub fn set_sort(&mut self, field: Field, direction: SortDirection) {
        if let Some(column) = self.get_mut(field) {
            column.sort = direction;
        }
    }

    pub fn clear_sort(&mut self, field: Field) {
        self.set_sort(field, SortDirection::None);
    }

    pub fn active_filters(&self) -> Vec<ActiveFilter> {
        self.columns
            .iter()
            .filter(|c| !c.filter.is_empty())
            .map(|c| ActiveFilter {
                field: c.key,
                text: c.filter.clone(),
            })
            .collect()
    }

    // Priority follows registry order
    pub fn active_sorts(&self) -> Vec<SortSpec> {
        self.columns
            .iter()
            .filter(|c| c.sort.is_active())
            .map(|c| SortSpec {
                field: c.key,
                direction: c.sort,
            })
            .collect()
    }
}
