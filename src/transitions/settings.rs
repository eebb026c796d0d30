use crate::db;
use rusqlite::Connection;
use serde_json::{json, Value};

pub const SETUP_KEY: &str = "setup.transitions";

pub const DEFAULT_GRADUATION_GRADE: u32 = 4;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionSettings {
    /// Grades at or above this are treated as terminal by suggestions.
    pub graduation_grade: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            graduation_grade: DEFAULT_GRADUATION_GRADE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

fn positive_u32(obj: &serde_json::Map<String, Value>, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(|v| v.as_u64())
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
}

impl TransitionSettings {
    /// A missing or malformed section falls back to defaults; store errors
    /// are returned.
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let obj = db::settings_get_raw(conn, SETUP_KEY)?
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let defaults = Self::default();
        let max_page_size = positive_u32(&obj, "maxPageSize").unwrap_or(defaults.max_page_size);
        Ok(Self {
            graduation_grade: positive_u32(&obj, "graduationGrade")
                .unwrap_or(defaults.graduation_grade),
            default_page_size: positive_u32(&obj, "defaultPageSize")
                .unwrap_or(defaults.default_page_size)
                .min(max_page_size),
            max_page_size,
        })
    }

    pub fn to_json(self) -> Value {
        json!({
            "graduationGrade": self.graduation_grade,
            "defaultPageSize": self.default_page_size,
            "maxPageSize": self.max_page_size,
        })
    }

    pub fn page_size(self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}
