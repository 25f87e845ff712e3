//! Decompose/recompose conversions between [`Conversation`] and flat rows.
//!
//! [`decompose`] breaks an aggregate into one root row and flat vectors of
//! dependent rows, assigning message `seq` and fragment `order_idx` from their
//! positions. [`recompose`] rebuilds the aggregate from rows, sorting messages
//! by `(created, seq)` and fragments by `order_idx`, and attaching side
//! entities only where a row exists.

use std::collections::HashMap;

use serde_json::{Map, Value};

use chatsync_core::{
    Conversation, ConversationId, Fragment, FragmentId, FragmentType, Message, MessageGenerator,
    MessageId, MessageMetadata, Part, Role, Timestamp, UserFlag,
};

use crate::error::StorageError;

/// Root row of the `conversations` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: String,
    pub user_title: Option<String>,
    pub auto_title: Option<String>,
    pub is_archived: bool,
    pub is_incognito: bool,
    pub user_symbol: Option<String>,
    pub system_purpose_id: String,
    pub created: Timestamp,
    pub updated: Option<Timestamp>,
    pub token_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: String,
    /// Position of the message in the aggregate; tie-breaker for `created`.
    pub seq: i64,
    pub role: String,
    pub purpose_id: Option<String>,
    pub token_count: i64,
    pub created: Timestamp,
    pub updated: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentRow {
    pub message_id: String,
    pub id: String,
    pub fragment_type: String,
    pub order_idx: i64,
    pub title: Option<String>,
    pub part_type: String,
    pub part_json: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub message_id: String,
    pub in_reference_to_json: Option<String>,
    pub entangled_json: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorRow {
    pub message_id: String,
    pub label: String,
    pub model_id: Option<String>,
    pub output_tokens: Option<i64>,
    pub metrics_json: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagRow {
    pub message_id: String,
    pub seq: i64,
    pub flag: String,
    pub value: Option<String>,
}

/// All rows of one conversation aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedConversation {
    pub root: ConversationRow,
    pub messages: Vec<MessageRow>,
    pub fragments: Vec<FragmentRow>,
    pub metadata: Vec<MetadataRow>,
    pub generators: Vec<GeneratorRow>,
    pub flags: Vec<FlagRow>,
}

fn opt_json(value: &Option<Value>) -> Result<Option<String>, StorageError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

fn parse_opt_json(raw: &Option<String>) -> Result<Option<Value>, StorageError> {
    raw.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(StorageError::from)
}

/// Decomposes a conversation into flat rows suitable for storage.
pub fn decompose(conversation: &Conversation) -> Result<DecomposedConversation, StorageError> {
    let root = ConversationRow {
        id: conversation.id.0.clone(),
        user_title: conversation.user_title.clone(),
        auto_title: conversation.auto_title.clone(),
        is_archived: conversation.is_archived,
        is_incognito: conversation.is_incognito,
        user_symbol: conversation.user_symbol.clone(),
        system_purpose_id: conversation.system_purpose_id.clone(),
        created: conversation.created,
        updated: conversation.updated,
        token_count: conversation.token_count,
    };

    let mut messages = Vec::with_capacity(conversation.messages.len());
    let mut fragments = Vec::new();
    let mut metadata = Vec::new();
    let mut generators = Vec::new();
    let mut flags = Vec::new();

    for (seq, message) in conversation.messages.iter().enumerate() {
        let message_id = message.id.0.clone();
        messages.push(MessageRow {
            id: message_id.clone(),
            seq: seq as i64,
            role: message.role.as_str().to_string(),
            purpose_id: message.purpose_id.clone(),
            token_count: message.token_count,
            created: message.created,
            updated: message.updated,
        });

        for (order_idx, fragment) in message.fragments.iter().enumerate() {
            fragments.push(FragmentRow {
                message_id: message_id.clone(),
                id: fragment.id.0.clone(),
                fragment_type: fragment.fragment_type.as_str().to_string(),
                order_idx: order_idx as i64,
                title: fragment.title.clone(),
                part_type: fragment.part.pt.clone(),
                part_json: serde_json::to_string(&fragment.part.body)?,
            });
        }

        if let Some(meta) = &message.metadata {
            metadata.push(MetadataRow {
                message_id: message_id.clone(),
                in_reference_to_json: opt_json(&meta.in_reference_to)?,
                entangled_json: opt_json(&meta.entangled)?,
            });
        }

        if let Some(generator) = &message.generator {
            generators.push(GeneratorRow {
                message_id: message_id.clone(),
                label: generator.label.clone(),
                model_id: generator.model_id.clone(),
                output_tokens: generator.output_tokens,
                metrics_json: opt_json(&generator.metrics)?,
            });
        }

        for (flag_seq, flag) in message.user_flags.iter().enumerate() {
            flags.push(FlagRow {
                message_id: message_id.clone(),
                seq: flag_seq as i64,
                flag: flag.flag.clone(),
                value: flag.value.clone(),
            });
        }
    }

    Ok(DecomposedConversation {
        root,
        messages,
        fragments,
        metadata,
        generators,
        flags,
    })
}

/// Rebuilds a conversation from its rows.
///
/// Rows may arrive in any order; ordering is re-established here.
pub fn recompose(decomposed: DecomposedConversation) -> Result<Conversation, StorageError> {
    let DecomposedConversation {
        root,
        mut messages,
        mut fragments,
        metadata,
        generators,
        mut flags,
    } = decomposed;

    messages.sort_by_key(|m| (m.created, m.seq));
    fragments.sort_by_key(|f| f.order_idx);
    flags.sort_by_key(|f| f.seq);

    let mut fragments_by_message: HashMap<String, Vec<Fragment>> = HashMap::new();
    for row in fragments {
        let fragment_type = FragmentType::parse(&row.fragment_type).ok_or_else(|| {
            StorageError::ReconstructionError {
                reason: format!(
                    "unknown fragment type '{}' on fragment {}",
                    row.fragment_type, row.id
                ),
            }
        })?;
        let body: Map<String, Value> = serde_json::from_str(&row.part_json)?;
        fragments_by_message
            .entry(row.message_id)
            .or_default()
            .push(Fragment {
                id: FragmentId(row.id),
                fragment_type,
                title: row.title,
                part: Part {
                    pt: row.part_type,
                    body,
                },
            });
    }

    let mut metadata_by_message: HashMap<String, MessageMetadata> = HashMap::new();
    for row in metadata {
        metadata_by_message.insert(
            row.message_id,
            MessageMetadata {
                in_reference_to: parse_opt_json(&row.in_reference_to_json)?,
                entangled: parse_opt_json(&row.entangled_json)?,
            },
        );
    }

    let mut generator_by_message: HashMap<String, MessageGenerator> = HashMap::new();
    for row in generators {
        generator_by_message.insert(
            row.message_id,
            MessageGenerator {
                label: row.label,
                model_id: row.model_id,
                output_tokens: row.output_tokens,
                metrics: parse_opt_json(&row.metrics_json)?,
            },
        );
    }

    let mut flags_by_message: HashMap<String, Vec<UserFlag>> = HashMap::new();
    for row in flags {
        flags_by_message.entry(row.message_id).or_default().push(UserFlag {
            flag: row.flag,
            value: row.value,
        });
    }

    let mut rebuilt = Vec::with_capacity(messages.len());
    for row in messages {
        let role = Role::parse(&row.role).ok_or_else(|| StorageError::ReconstructionError {
            reason: format!("unknown role '{}' on message {}", row.role, row.id),
        })?;
        rebuilt.push(Message {
            role,
            purpose_id: row.purpose_id,
            token_count: row.token_count,
            created: row.created,
            updated: row.updated,
            metadata: metadata_by_message.remove(&row.id),
            generator: generator_by_message.remove(&row.id),
            user_flags: flags_by_message.remove(&row.id).unwrap_or_default(),
            fragments: fragments_by_message.remove(&row.id).unwrap_or_default(),
            id: MessageId(row.id),
        });
    }

    if let Some(orphan) = fragments_by_message.keys().next() {
        return Err(StorageError::IntegrityError {
            reason: format!(
                "fragments reference missing message {} in conversation {}",
                orphan, root.id
            ),
        });
    }

    Ok(Conversation {
        id: ConversationId(root.id),
        user_title: root.user_title,
        auto_title: root.auto_title,
        is_archived: root.is_archived,
        is_incognito: root.is_incognito,
        user_symbol: root.user_symbol,
        system_purpose_id: root.system_purpose_id,
        created: root.created,
        updated: root.updated,
        token_count: root.token_count,
        messages: rebuilt,
        generation: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_core::DEFAULT_SYSTEM_PURPOSE;
    use serde_json::json;

    fn sample() -> Conversation {
        let mut conversation = Conversation::new(DEFAULT_SYSTEM_PURPOSE);
        let mut first = Message::new_text(Role::User, "hello");
        first.created = 10;
        first.set_flag("starred", None, true);
        let mut second = Message::new_text(Role::Assistant, "hi");
        second.created = 20;
        second.fragments.push(Fragment::attachment(
            "image",
            Part::image_ref(json!({"reftype": "dblob", "dblobAssetId": "a1"}), None),
        ));
        second.generator = Some(MessageGenerator {
            label: "GPT".into(),
            model_id: Some("gpt".into()),
            output_tokens: Some(12),
            metrics: Some(json!({"tps": 40.5})),
        });
        second.metadata = Some(MessageMetadata {
            in_reference_to: Some(json!([{"mrt": "dmsg", "mText": "hello"}])),
            entangled: None,
        });
        conversation.messages = vec![first, second];
        conversation
    }

    #[test]
    fn decompose_assigns_positions() {
        let rows = decompose(&sample()).unwrap();
        assert_eq!(rows.messages.len(), 2);
        assert_eq!(rows.messages[1].seq, 1);
        let orders: Vec<i64> = rows
            .fragments
            .iter()
            .filter(|f| f.message_id == rows.messages[1].id)
            .map(|f| f.order_idx)
            .collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(rows.generators.len(), 1);
        assert_eq!(rows.metadata.len(), 1);
        assert_eq!(rows.flags.len(), 1);
    }

    #[test]
    fn recompose_restores_order_from_shuffled_rows() {
        let original = sample();
        let mut rows = decompose(&original).unwrap();
        rows.messages.reverse();
        rows.fragments.reverse();
        assert_eq!(recompose(rows).unwrap(), original);
    }

    #[test]
    fn equal_created_times_fall_back_to_sequence() {
        let mut original = sample();
        for message in &mut original.messages {
            message.created = 5;
        }
        let mut rows = decompose(&original).unwrap();
        rows.messages.reverse();
        assert_eq!(recompose(rows).unwrap(), original);
    }

    #[test]
    fn unknown_role_is_a_reconstruction_error() {
        let mut rows = decompose(&sample()).unwrap();
        rows.messages[0].role = "robot".into();
        assert!(matches!(
            recompose(rows),
            Err(StorageError::ReconstructionError { .. })
        ));
    }

    #[test]
    fn orphan_fragments_are_an_integrity_error() {
        let mut rows = decompose(&sample()).unwrap();
        rows.fragments[0].message_id = "ghost".into();
        assert!(matches!(
            recompose(rows),
            Err(StorageError::IntegrityError { .. })
        ));
    }
}
