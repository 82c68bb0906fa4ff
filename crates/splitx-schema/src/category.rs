use crate::split_meta::SplitMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Split category, declared in display priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Base,
    Feature,
    ConfigAbi,
    ConfigLocale,
    ConfigDensity,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Base,
        Category::Feature,
        Category::ConfigAbi,
        Category::ConfigLocale,
        Category::ConfigDensity,
        Category::Unknown,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Category::Base => "Base APK",
            Category::Feature => "Dynamic features",
            Category::ConfigAbi => "Native code",
            Category::ConfigLocale => "Languages",
            Category::ConfigDensity => "Screen density",
            Category::Unknown => "Unknown splits",
        }
    }

    pub fn description(self) -> Option<&'static str> {
        match self {
            Category::Unknown => Some(
                "These splits could not be classified. They are installed unless deselected.",
            ),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Base => write!(f, "base"),
            Category::Feature => write!(f, "feature"),
            Category::ConfigAbi => write!(f, "config_abi"),
            Category::ConfigLocale => write!(f, "config_locale"),
            Category::ConfigDensity => write!(f, "config_density"),
            Category::Unknown => write!(f, "unknown"),
        }
    }
}

/// One classified package placed into a resolution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPart {
    pub meta: SplitMeta,
    /// Entry name inside the source archive.
    pub entry_name: String,
    pub local_path: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_base: bool,
    /// Must always be installed, regardless of the target device.
    pub is_required: bool,
    /// Applies to the target device. Starts equal to `is_required` and is
    /// raised by the device-aware post-processor.
    pub is_recommended: bool,
}

impl SplitPart {
    pub fn new(
        meta: SplitMeta,
        entry_name: impl Into<String>,
        local_path: impl Into<String>,
        display_name: impl Into<String>,
        description: Option<String>,
        is_base: bool,
        is_required: bool,
    ) -> Self {
        Self {
            meta,
            entry_name: entry_name.into(),
            local_path: local_path.into(),
            display_name: display_name.into(),
            description,
            is_base,
            is_required,
            is_recommended: is_required,
        }
    }
}

/// All parts of one category, in archive encounter order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCategory {
    pub category: Category,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parts: Vec<SplitPart>,
}

impl SplitCategory {
    pub fn new(category: Category, title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            category,
            title: title.into(),
            description,
            parts: Vec::new(),
        }
    }

    pub fn add_part(&mut self, part: SplitPart) -> &mut Self {
        self.parts.push(part);
        self
    }
}

/// Per-resolution index of categories, keyed and ordered by [`Category`].
///
/// Categories are created on first use; later `get_or_create` calls reuse the
/// existing entry and ignore their title and description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitCategoryIndex {
    categories: BTreeMap<Category, SplitCategory>,
}

impl SplitCategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        category: Category,
        title: &str,
        description: Option<&str>,
    ) -> &mut SplitCategory {
        self.categories
            .entry(category)
            .or_insert_with(|| SplitCategory::new(category, title, description.map(str::to_owned)))
    }

    /// Shorthand for [`get_or_create`](Self::get_or_create) with the category's default texts.
    pub fn category(&mut self, category: Category) -> &mut SplitCategory {
        self.get_or_create(category, category.title(), category.description())
    }

    pub fn get(&self, category: Category) -> Option<&SplitCategory> {
        self.categories.get(&category)
    }

    pub fn get_mut(&mut self, category: Category) -> Option<&mut SplitCategory> {
        self.categories.get_mut(&category)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SplitCategory> {
        self.categories.values_mut()
    }

    /// Number of categories created so far, empty ones included.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Non-empty categories in priority order.
    pub fn into_list(self) -> Vec<SplitCategory> {
        self.categories
            .into_values()
            .filter(|c| !c.parts.is_empty())
            .collect()
    }
}
