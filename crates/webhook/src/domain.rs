//! The demo business entity produced through the outbox and consumed on
//! the other side by `consumer-app`: `{Id, Name}` with `Name` nullable.

use serde::{Deserialize, Serialize};

pub const ORDER_MESSAGE_TYPE: &str = "Order";
pub const ORDER_TOPIC: &str = "orders";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: u64,
    pub name: Option<String>,
}

impl Order {
    pub fn partition_key(&self) -> String {
        self.id.to_string()
    }
}
