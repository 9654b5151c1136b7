use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_type")]
pub enum PlanType {
    #[sqlx(rename = "7_days")]
    #[serde(rename = "7_days")]
    Days7,
    #[sqlx(rename = "30_days")]
    #[serde(rename = "30_days")]
    Days30,
    #[sqlx(rename = "daily")]
    #[serde(rename = "daily")]
    Daily,
    #[sqlx(rename = "custom")]
    #[serde(rename = "custom")]
    Custom,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Days7 => "7_days",
            PlanType::Days30 => "30_days",
            PlanType::Daily => "daily",
            PlanType::Custom => "custom",
        }
    }

    /// Plan label for a purchased duration. Prices live in the front-end, so
    /// anything that is not one of the catalogue durations is `Custom`.
    pub fn from_days(days: i32) -> Self {
        match days {
            1 => PlanType::Daily,
            7 => PlanType::Days7,
            30 => PlanType::Days30,
            _ => PlanType::Custom,
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
