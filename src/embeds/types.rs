use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const GLOBAL_CATEGORY: &str = "global";

/// A category reference inside CTA/Form configuration: either a real
/// category row or the `"global"` pseudo-category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryRef {
    Global,
    Category(Uuid),
}

impl CategoryRef {
    pub fn category_id(&self) -> Option<Uuid> {
        match self {
            Self::Global => None,
            Self::Category(id) => Some(*id),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl std::str::FromStr for CategoryRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(GLOBAL_CATEGORY) {
            return Ok(Self::Global);
        }
        Uuid::parse_str(s)
            .map(Self::Category)
            .map_err(|_| format!("Invalid category reference: {s}"))
    }
}

impl TryFrom<String> for CategoryRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CategoryRef> for String {
    fn from(value: CategoryRef) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for CategoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str(GLOBAL_CATEGORY),
            Self::Category(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CtaType {
    Banner,
    Popup,
    Inline,
    SlideIn,
    Sticky,
}

impl CtaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Banner => "banner",
            Self::Popup => "popup",
            Self::Inline => "inline",
            Self::SlideIn => "slideIn",
            Self::Sticky => "sticky",
        }
    }
}

impl std::str::FromStr for CtaType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "banner" => Ok(Self::Banner),
            "popup" => Ok(Self::Popup),
            "inline" => Ok(Self::Inline),
            "slidein" | "slide_in" => Ok(Self::SlideIn),
            "sticky" => Ok(Self::Sticky),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CtaTrigger {
    #[default]
    Immediate,
    Scroll {
        percent: u8,
    },
    Delay {
        seconds: u32,
    },
    ExitIntent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CtaContent {
    #[serde(default)]
    pub headline: String,
    pub body: Option<String>,
    pub button_text: Option<String>,
    pub button_url: Option<String>,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CtaConfig {
    pub cta_name: String,
    #[serde(rename = "type")]
    pub cta_type: CtaType,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
    #[serde(default)]
    pub trigger: CtaTrigger,
    #[serde(default)]
    pub content: CtaContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredCtaConfig {
    pub id: Uuid,
    pub config: CtaConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

/// Contents of the `ctasConfig` column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CtasDocument {
    #[serde(default)]
    pub ctas: Vec<StoredCtaConfig>,
    #[serde(default)]
    pub tag_mapping: BTreeMap<Uuid, Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FormFieldType {
    Text,
    Email,
    Textarea,
    Select,
    Checkbox,
    Phone,
    Number,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FormFieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    #[serde(default)]
    pub fields: Vec<FormField>,
    pub submit_text: Option<String>,
    pub success_message: Option<String>,
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredFormConfig {
    pub id: Uuid,
    pub name: String,
    pub category_id: Option<CategoryRef>,
    pub config: FormConfig,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

/// Contents of the `formsConfig` column. Form mappings travel with the forms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FormsDocument {
    #[serde(default)]
    pub forms: Vec<StoredFormConfig>,
    #[serde(default)]
    pub category_mapping: BTreeMap<Uuid, Uuid>,
    #[serde(default)]
    pub tag_mapping: BTreeMap<Uuid, Uuid>,
    pub global_default_form_id: Option<Uuid>,
}
