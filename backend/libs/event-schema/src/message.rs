use serde::{Deserialize, Serialize};

/// Kafka message ready for producing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMessage {
    /// Partition key (decimal event id)
    pub key: String,
    /// Message value (JSON event document)
    pub value: String,
}
