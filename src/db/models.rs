use serde::{Deserialize, Serialize};

use crate::model::PinType;

/// A watched thread.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pin {
    pub id: i64,
    pub site: String,
    pub board: String,
    pub thread_no: i64,
    pub post_no: i64,
    pub subject: Option<String>,
    pub pin_type: String,
    pub created_at: String,
}

/// Data for inserting a new pin.
#[derive(Debug, Clone)]
pub struct NewPin {
    pub site: String,
    pub board: String,
    pub thread_no: u64,
    /// Post that triggered the pin.
    pub post_no: u64,
    pub subject: Option<String>,
    pub pin_type: PinType,
}
