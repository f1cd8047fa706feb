//! Agent/feedback registry event decoders.
//!
//! - `AgentRegistered(address indexed agent, string metadataUri)`
//! - `FeedbackSubmitted(address indexed agent, address indexed reviewer,
//!   uint8 rating, string comment)`

use ethers::abi::ParamType;
use ethers::types::{Address, Log, H256};

use crate::decode::{decode_data, event_topic, token_string, token_uint, topic_address};
use crate::error::{IndexerError, IndexerResult};

pub const AGENT_REGISTERED: &str = "AgentRegistered(address,string)";
pub const FEEDBACK_SUBMITTED: &str = "FeedbackSubmitted(address,address,uint8,string)";

/// Both registry signature topics, in one scan filter
#[must_use]
pub fn signatures() -> Vec<H256> {
    vec![event_topic(AGENT_REGISTERED), event_topic(FEEDBACK_SUBMITTED)]
}

/// Typed registry event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Agent registered itself
    AgentRegistered {
        /// Registered agent
        agent: Address,
        /// Off-chain metadata location
        metadata_uri: String,
    },
    /// Feedback submitted against an agent
    FeedbackSubmitted {
        /// Reviewed agent
        agent: Address,
        /// Reviewing address
        reviewer: Address,
        /// Rating, 0-255 per contract
        rating: u8,
        /// Free-form comment
        comment: String,
    },
}

/// Decode one registry contract log.
///
/// # Errors
///
/// Returns a decode error for unknown signatures or malformed topics/data.
pub fn decode_registry_log(log: &Log) -> IndexerResult<RegistryEvent> {
    let signature = log
        .topics
        .first()
        .copied()
        .ok_or_else(|| IndexerError::decode("registry", "log has no topics"))?;

    if signature == event_topic(AGENT_REGISTERED) {
        let mut data = decode_data(AGENT_REGISTERED, log, &[ParamType::String])?.into_iter();
        Ok(RegistryEvent::AgentRegistered {
            agent: topic_address(AGENT_REGISTERED, log, 1)?,
            metadata_uri: token_string(AGENT_REGISTERED, data.next(), "metadataUri")?,
        })
    } else if signature == event_topic(FEEDBACK_SUBMITTED) {
        let mut data = decode_data(
            FEEDBACK_SUBMITTED,
            log,
            &[ParamType::Uint(8), ParamType::String],
        )?
        .into_iter();
        let rating = token_uint(FEEDBACK_SUBMITTED, data.next(), "rating")?;
        Ok(RegistryEvent::FeedbackSubmitted {
            agent: topic_address(FEEDBACK_SUBMITTED, log, 1)?,
            reviewer: topic_address(FEEDBACK_SUBMITTED, log, 2)?,
            rating: u8::try_from(rating.low_u64().min(u64::from(u8::MAX)))
                .unwrap_or(u8::MAX),
            comment: token_string(FEEDBACK_SUBMITTED, data.next(), "comment")?,
        })
    } else {
        Err(IndexerError::decode(
            "registry",
            format!("unknown signature {signature:#x}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::Token;

    #[test]
    fn decodes_agent_registered() {
        let log = Log {
            topics: vec![
                event_topic(AGENT_REGISTERED),
                H256::from(Address::repeat_byte(0x11)),
            ],
            data: ethers::abi::encode(&[Token::String("ipfs://agent-card".to_string())]).into(),
            ..Default::default()
        };
        let event = decode_registry_log(&log).unwrap();
        assert_eq!(
            event,
            RegistryEvent::AgentRegistered {
                agent: Address::repeat_byte(0x11),
                metadata_uri: "ipfs://agent-card".to_string(),
            }
        );
    }

    #[test]
    fn decodes_feedback_submitted() {
        let log = Log {
            topics: vec![
                event_topic(FEEDBACK_SUBMITTED),
                H256::from(Address::repeat_byte(0x11)),
                H256::from(Address::repeat_byte(0x22)),
            ],
            data: ethers::abi::encode(&[
                Token::Uint(5u8.into()),
                Token::String("fast and correct".to_string()),
            ])
            .into(),
            ..Default::default()
        };
        match decode_registry_log(&log).unwrap() {
            RegistryEvent::FeedbackSubmitted {
                agent,
                reviewer,
                rating,
                comment,
            } => {
                assert_eq!(agent, Address::repeat_byte(0x11));
                assert_eq!(reviewer, Address::repeat_byte(0x22));
                assert_eq!(rating, 5);
                assert_eq!(comment, "fast and correct");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
