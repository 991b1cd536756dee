use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use crate::constants::{DEFAULT_CATEGORIES, DEFAULT_PLAN};

/// Per-day ceiling for one (plan, category) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCeiling", into = "RawCeiling")]
pub enum Ceiling {
    Limited(u64),
    Unlimited,
}

impl Ceiling {
    /// Whether a record that has already used `used` may take one more.
    pub fn permits(self, used: u64) -> bool {
        match self {
            Ceiling::Limited(max) => used < max,
            Ceiling::Unlimited => true,
        }
    }

    /// Remaining admissions after `used`, `None` when unlimited.
    pub fn remaining(self, used: u64) -> Option<u64> {
        match self {
            Ceiling::Limited(max) => Some(max.saturating_sub(used)),
            Ceiling::Unlimited => None,
        }
    }

    pub fn as_option(self) -> Option<u64> {
        match self {
            Ceiling::Limited(max) => Some(max),
            Ceiling::Unlimited => None,
        }
    }
}

impl fmt::Display for Ceiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ceiling::Limited(max) => write!(f, "{max}"),
            Ceiling::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Wire form of a ceiling: an integer, `null`, or the string "unlimited".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCeiling {
    Count(u64),
    Keyword(Option<String>),
}

impl TryFrom<RawCeiling> for Ceiling {
    type Error = String;

    fn try_from(raw: RawCeiling) -> Result<Self, Self::Error> {
        match raw {
            RawCeiling::Count(n) => Ok(Ceiling::Limited(n)),
            RawCeiling::Keyword(None) => Ok(Ceiling::Unlimited),
            RawCeiling::Keyword(Some(s)) if s.eq_ignore_ascii_case("unlimited") => {
                Ok(Ceiling::Unlimited)
            }
            RawCeiling::Keyword(Some(s)) => Err(format!(
                "invalid ceiling {s:?}: expected a non-negative integer, null or \"unlimited\""
            )),
        }
    }
}

impl From<Ceiling> for RawCeiling {
    fn from(ceiling: Ceiling) -> Self {
        match ceiling {
            Ceiling::Limited(n) => RawCeiling::Count(n),
            Ceiling::Unlimited => RawCeiling::Keyword(Some("unlimited".to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LimitsError {
    #[error("limit table has no categories")]
    NoCategories,

    #[error("category {0:?} is listed more than once")]
    DuplicateCategory(String),

    #[error("plan {plan:?} has no ceiling for category {category:?}")]
    MissingCeiling { plan: String, category: String },

    #[error("plan {plan:?} names unknown category {category:?}")]
    UnknownCategory { plan: String, category: String },

    #[error("default plan {0:?} has no row in the limit table")]
    MissingDefaultPlan(String),

    #[error("Failed to read limits file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse limits file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidSetting { var: &'static str, value: String },
}

/// On-disk layout of the limits file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsFile {
    #[serde(default = "default_plan_name")]
    pub default_plan: String,
    pub categories: Vec<String>,
    pub plans: BTreeMap<String, BTreeMap<String, Ceiling>>,
}

fn default_plan_name() -> String {
    DEFAULT_PLAN.to_string()
}

/// Immutable plan -> category -> ceiling table.
///
/// Categories are stored in configuration order and addressed by index, so a
/// usage record is a flat vector of counters.
#[derive(Debug, Clone)]
pub struct LimitTable {
    categories: Vec<String>,
    plans: HashMap<String, Vec<Ceiling>>,
    default_plan: String,
}

impl LimitTable {
    pub fn from_file_contents(file: LimitsFile) -> Result<Self, LimitsError> {
        if file.categories.is_empty() {
            return Err(LimitsError::NoCategories);
        }

        let mut categories: Vec<String> = Vec::with_capacity(file.categories.len());
        for raw in file.categories {
            let name = normalize(&raw);
            if categories.contains(&name) {
                return Err(LimitsError::DuplicateCategory(name));
            }
            categories.push(name);
        }

        let mut plans = HashMap::with_capacity(file.plans.len());
        for (plan, row) in file.plans {
            let plan = normalize(&plan);
            let row: HashMap<String, Ceiling> =
                row.into_iter().map(|(c, v)| (normalize(&c), v)).collect();

            if let Some(extra) = row.keys().find(|c| !categories.contains(c)) {
                return Err(LimitsError::UnknownCategory {
                    plan,
                    category: extra.clone(),
                });
            }

            let ceilings = categories
                .iter()
                .map(|category| {
                    row.get(category)
                        .copied()
                        .ok_or_else(|| LimitsError::MissingCeiling {
                            plan: plan.clone(),
                            category: category.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            plans.insert(plan, ceilings);
        }

        let default_plan = normalize(&file.default_plan);
        if !plans.contains_key(&default_plan) {
            return Err(LimitsError::MissingDefaultPlan(default_plan));
        }

        Ok(Self {
            categories,
            plans,
            default_plan,
        })
    }

    pub fn load(path: &Path) -> Result<Self, LimitsError> {
        let content = std::fs::read_to_string(path).map_err(|source| LimitsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: LimitsFile =
            serde_json::from_str(&content).map_err(|source| LimitsError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_file_contents(file)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Position of a category in the table, `None` if it is not configured.
    pub fn category_index(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }

    pub fn default_plan(&self) -> &str {
        &self.default_plan
    }

    /// Resolve a caller-supplied plan token to a configured plan name.
    /// Absent, blank and unknown tokens fall back to the default plan.
    pub fn resolve_plan<'a>(&'a self, token: Option<&str>) -> &'a str {
        token
            .map(normalize)
            .and_then(|plan| self.plans.get_key_value(&plan).map(|(k, _)| k.as_str()))
            .unwrap_or(self.default_plan.as_str())
    }

    /// Ceiling for a resolved plan and category index.
    pub fn ceiling(&self, plan: &str, category: usize) -> Ceiling {
        let row = self
            .plans
            .get(plan)
            .unwrap_or_else(|| &self.plans[&self.default_plan]);
        row[category]
    }

    /// Plan names in sorted order with their ceilings keyed by category.
    pub fn rows(&self) -> BTreeMap<&str, BTreeMap<&str, Ceiling>> {
        self.plans
            .iter()
            .map(|(plan, ceilings)| {
                let row = self
                    .categories
                    .iter()
                    .map(String::as_str)
                    .zip(ceilings.iter().copied())
                    .collect();
                (plan.as_str(), row)
            })
            .collect()
    }
}

impl Default for LimitTable {
    fn default() -> Self {
        let row = |code, chat, error| {
            DEFAULT_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .zip([code, chat, error])
                .collect::<BTreeMap<_, _>>()
        };
        let file = LimitsFile {
            default_plan: DEFAULT_PLAN.to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            plans: BTreeMap::from([
                (
                    "guest".to_string(),
                    row(Ceiling::Limited(10), Ceiling::Limited(3), Ceiling::Limited(10)),
                ),
                (
                    "free".to_string(),
                    row(Ceiling::Limited(30), Ceiling::Limited(3), Ceiling::Limited(30)),
                ),
                (
                    "premium".to_string(),
                    row(Ceiling::Unlimited, Ceiling::Unlimited, Ceiling::Unlimited),
                ),
            ]),
        };
        match Self::from_file_contents(file) {
            Ok(table) => table,
            Err(e) => unreachable!("built-in limit table is invalid: {e}"),
        }
    }
}

fn normalize(token: &str) -> String {
    token.trim().to_ascii_lowercase()
}
