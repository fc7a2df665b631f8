use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::{EngineError, Subject};

/// One decoded audit-log record. Serializes back to the vendor's field
/// names (`seq`, `msgid`, `from`, ...) so batches can be persisted in the
/// shape downstream tooling already consumes.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    #[serde(rename = "seq")]
    pub sequence: u64,
    #[serde(rename = "msgid")]
    pub msg_id: String,
    pub action: String,
    #[serde(rename = "from")]
    pub sender: String,
    #[serde(rename = "tolist")]
    pub recipients: Vec<String>,
    #[serde(rename = "roomid")]
    pub room_id: String,
    #[serde(rename = "msgtime")]
    pub timestamp: u64,
    pub content: MessageContent,
}

impl AuditRecord {
    /// Builds a record from decrypted plaintext. `envelope_msg_id` fills in
    /// when the plaintext omits its own `msgid`.
    pub fn from_plaintext(
        sequence: u64,
        envelope_msg_id: &str,
        plaintext: &[u8],
    ) -> Result<Self, EngineError> {
        let malformed = |detail: String| EngineError::Malformed {
            subject: Subject::Sequence(sequence),
            detail,
        };

        let value: Value = serde_json::from_slice(plaintext)
            .map_err(|err| malformed(format!("plaintext is not JSON: {err}")))?;
        if !value.is_object() {
            return Err(malformed("plaintext is not a JSON object".into()));
        }

        let content = MessageContent::from_plain(&value).map_err(malformed)?;

        Ok(Self {
            sequence,
            msg_id: str_field(&value, "msgid")
                .unwrap_or_else(|| envelope_msg_id.to_string()),
            action: str_field(&value, "action").unwrap_or_else(|| "send".to_string()),
            sender: str_field(&value, "from").unwrap_or_default(),
            recipients: string_list(&value, "tolist"),
            room_id: str_field(&value, "roomid").unwrap_or_default(),
            timestamp: value.get("msgtime").and_then(Value::as_u64).unwrap_or_default(),
            content,
        })
    }

    /// Every media blob this record points at, including second-level
    /// references inside mixed-message items.
    pub fn media_references(&self) -> Vec<MediaReference> {
        self.content.media_references()
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect()
        })
        .unwrap_or_default()
}

/// Content union keyed by the plaintext `msgtype`. Unknown tags land in
/// `Other` instead of failing the record, since the vendor adds types over
/// time.
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(TextContent),
    Image(MediaReference),
    File(FileContent),
    Voice(MediaReference),
    Video(MediaReference),
    Emotion(MediaReference),
    Revoke(RevokeContent),
    Mixed(MixedContent),
    Other { msgtype: String, raw: Value },
}

impl MessageContent {
    pub fn msgtype(&self) -> &str {
        match self {
            MessageContent::Text(_) => "text",
            MessageContent::Image(_) => "image",
            MessageContent::File(_) => "file",
            MessageContent::Voice(_) => "voice",
            MessageContent::Video(_) => "video",
            MessageContent::Emotion(_) => "emotion",
            MessageContent::Revoke(_) => "revoke",
            MessageContent::Mixed(_) => "mixed",
            MessageContent::Other { msgtype, .. } => msgtype,
        }
    }

    /// Decodes the union from a plaintext record body. The section under the
    /// key named by `msgtype` holds the typed payload.
    pub fn from_plain(value: &Value) -> Result<Self, String> {
        let msgtype = value
            .get("msgtype")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing msgtype".to_string())?;
        let section = value.get(msgtype).cloned().unwrap_or(Value::Null);
        let typed = |err: serde_json::Error| format!("bad {msgtype} section: {err}");

        Ok(match msgtype {
            "text" => MessageContent::Text(serde_json::from_value(section).map_err(typed)?),
            "image" => MessageContent::Image(serde_json::from_value(section).map_err(typed)?),
            "file" => MessageContent::File(serde_json::from_value(section).map_err(typed)?),
            "voice" => MessageContent::Voice(serde_json::from_value(section).map_err(typed)?),
            "video" => MessageContent::Video(serde_json::from_value(section).map_err(typed)?),
            "emotion" => MessageContent::Emotion(serde_json::from_value(section).map_err(typed)?),
            "revoke" => MessageContent::Revoke(serde_json::from_value(section).map_err(typed)?),
            "mixed" => MessageContent::Mixed(MixedContent::from_section(&section)?),
            other => MessageContent::Other { msgtype: other.to_string(), raw: section },
        })
    }

    pub fn media_references(&self) -> Vec<MediaReference> {
        match self {
            MessageContent::Image(media)
            | MessageContent::Voice(media)
            | MessageContent::Video(media)
            | MessageContent::Emotion(media) => vec![media.clone()],
            MessageContent::File(file) => vec![file.media.clone()],
            MessageContent::Mixed(mixed) => mixed
                .item
                .iter()
                .filter_map(|item| match &item.detail {
                    MixedDetail::Image(media) => Some(media.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Serialize for MessageContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("msgtype", self.msgtype())?;
        match self {
            MessageContent::Text(text) => map.serialize_entry("text", text)?,
            MessageContent::Image(media) => map.serialize_entry("image", media)?,
            MessageContent::File(file) => map.serialize_entry("file", file)?,
            MessageContent::Voice(media) => map.serialize_entry("voice", media)?,
            MessageContent::Video(media) => map.serialize_entry("video", media)?,
            MessageContent::Emotion(media) => map.serialize_entry("emotion", media)?,
            MessageContent::Revoke(revoke) => map.serialize_entry("revoke", revoke)?,
            MessageContent::Mixed(mixed) => map.serialize_entry("mixed", mixed)?,
            MessageContent::Other { msgtype, raw } => {
                if !raw.is_null() {
                    map.serialize_entry(msgtype, raw)?;
                }
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

/// Addresses one media blob for chunked retrieval. Carries no bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub sdkfileid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

impl MediaReference {
    pub fn new(sdkfileid: impl Into<String>) -> Self {
        Self { sdkfileid: sdkfileid.into(), md5sum: None, filesize: None }
    }

    pub fn with_md5sum(mut self, md5sum: impl Into<String>) -> Self {
        self.md5sum = Some(md5sum.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileContent {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub fileext: String,
    #[serde(flatten)]
    pub media: MediaReference,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevokeContent {
    #[serde(default)]
    pub pre_msgid: String,
}

/// A mixed message: an ordered list of items, each carrying its typed
/// payload double-encoded as a JSON string in `content`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MixedContent {
    pub item: Vec<MixedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MixedItem {
    #[serde(rename = "type")]
    pub kind: String,
    /// The embedded JSON string exactly as the vendor delivered it.
    pub content: String,
    /// Second decode stage over `content`.
    #[serde(skip)]
    pub detail: MixedDetail,
}

#[derive(Debug, Clone)]
pub enum MixedDetail {
    Text { content: String },
    Image(MediaReference),
    Opaque(Value),
}

impl MixedContent {
    fn from_section(section: &Value) -> Result<Self, String> {
        let entries = section.get("item").and_then(Value::as_array);
        let mut item = Vec::with_capacity(entries.map_or(0, Vec::len));
        for entry in entries.into_iter().flatten() {
            let kind = entry
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| "mixed item missing type".to_string())?
                .to_string();
            let content = entry
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("mixed {kind} item missing content"))?
                .to_string();
            let detail = MixedDetail::decode(&kind, &content)?;
            item.push(MixedItem { kind, content, detail });
        }
        Ok(Self { item })
    }
}

impl MixedDetail {
    /// The second decode stage: `content` is itself a JSON document.
    fn decode(kind: &str, content: &str) -> Result<Self, String> {
        let inner: Value = serde_json::from_str(content)
            .map_err(|err| format!("mixed {kind} item content is not JSON: {err}"))?;
        Ok(match kind {
            "text" => MixedDetail::Text {
                content: inner.get("content").and_then(Value::as_str).unwrap_or_default().to_string(),
            },
            "image" => MixedDetail::Image(
                serde_json::from_value(inner)
                    .map_err(|err| format!("mixed image item: {err}"))?,
            ),
            _ => MixedDetail::Opaque(inner),
        })
    }
}
