use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One entry in a conversation. `tool_call_id` is populated on `role=tool`
/// messages; `tool_calls` carries the raw batch an assistant message
/// requested (one canonical-JSON `ToolCall` per entry), preserved so the
/// pairing invariant (§8) can be checked. `agent_source` names which
/// orchestrator role (planner/tinkerer/judge) produced the message; `None`
/// for user/tool messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub conv_id: String,
    pub role: Role,
    pub content: String,
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<String>,
    #[serde(default)]
    pub agent_source: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(conv_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conv_id: conv_id.into(),
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            agent_source: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(conv_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conv_id: conv_id.into(),
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            agent_source: None,
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn that requested one or more tool calls.
    /// `tool_calls` is the canonical JSON of each `ToolCall` in emission
    /// order, preserved so the pairing invariant (§8) can be checked later.
    pub fn assistant_tool_calls(
        conv_id: impl Into<String>,
        agent_source: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Vec<String>,
    ) -> Self {
        Self {
            conv_id: conv_id.into(),
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls,
            agent_source: Some(agent_source.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_final(conv_id: impl Into<String>, agent_source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conv_id: conv_id.into(),
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            agent_source: Some(agent_source.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(conv_id: impl Into<String>, tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conv_id: conv_id.into(),
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
            agent_source: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MessageLogError {
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for MessageLogError {
    fn from(e: rusqlite::Error) -> Self {
        MessageLogError::Database(e.to_string())
    }
}

/// Append-only, insertion-order-stable, random-access by index (§4.8).
/// Window virtualisation across arbitrarily long conversations is an
/// external collaborator's job — this trait only guarantees the tail
/// stays reachable after every append.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&mut self, message: Message) -> Result<(), MessageLogError>;
    async fn count(&self, conv_id: &str) -> Result<usize, MessageLogError>;
    async fn load_range(&self, conv_id: &str, start: usize, end: usize) -> Result<Vec<Message>, MessageLogError>;
}

#[derive(Default)]
pub struct InMemoryMessageLog {
    messages: std::collections::HashMap<String, Vec<Message>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&mut self, message: Message) -> Result<(), MessageLogError> {
        self.messages.entry(message.conv_id.clone()).or_default().push(message);
        Ok(())
    }

    async fn count(&self, conv_id: &str) -> Result<usize, MessageLogError> {
        Ok(self.messages.get(conv_id).map(|v| v.len()).unwrap_or(0))
    }

    async fn load_range(&self, conv_id: &str, start: usize, end: usize) -> Result<Vec<Message>, MessageLogError> {
        Ok(self
            .messages
            .get(conv_id)
            .map(|v| v.iter().skip(start).take(end.saturating_sub(start)).cloned().collect())
            .unwrap_or_default())
    }
}

/// Sqlite-backed log, mirroring the teacher's `SqliteCheckpointStore`
/// shape (open connection, `CREATE TABLE IF NOT EXISTS`, `params!`,
/// `row.get()`).
pub struct SqliteMessageLog {
    conn: Connection,
}

impl SqliteMessageLog {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, MessageLogError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, MessageLogError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, MessageLogError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                conv_id      TEXT NOT NULL,
                seq          INTEGER NOT NULL,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                tool_call_id TEXT,
                tool_calls   TEXT NOT NULL,
                agent_source TEXT,
                timestamp    TEXT NOT NULL,
                PRIMARY KEY (conv_id, seq)
            );",
        )?;
        Ok(Self { conn })
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    fn parse_role(s: &str) -> Role {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }
}

#[async_trait]
impl MessageLog for SqliteMessageLog {
    async fn append(&mut self, message: Message) -> Result<(), MessageLogError> {
        let seq: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE conv_id = ?1",
            params![message.conv_id],
            |row| row.get(0),
        )?;
        let tool_calls_json = serde_json::to_string(&message.tool_calls).unwrap_or_default();
        self.conn.execute(
            "INSERT INTO messages (conv_id, seq, role, content, tool_call_id, tool_calls, agent_source, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.conv_id,
                seq,
                Self::role_str(message.role),
                message.content,
                message.tool_call_id,
                tool_calls_json,
                message.agent_source,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn count(&self, conv_id: &str) -> Result<usize, MessageLogError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM messages WHERE conv_id = ?1", params![conv_id], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn load_range(&self, conv_id: &str, start: usize, end: usize) -> Result<Vec<Message>, MessageLogError> {
        let mut stmt = self.conn.prepare(
            "SELECT role, content, tool_call_id, tool_calls, agent_source, timestamp
             FROM messages WHERE conv_id = ?1 AND seq >= ?2 AND seq < ?3 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![conv_id, start as i64, end as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (role, content, tool_call_id, tool_calls_json, agent_source, timestamp) = row?;
            let tool_calls: Vec<String> = serde_json::from_str(&tool_calls_json).unwrap_or_default();
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            out.push(Message {
                conv_id: conv_id.to_string(),
                role: Self::parse_role(&role),
                content,
                tool_call_id,
                tool_calls,
                agent_source,
                timestamp,
            });
        }
        Ok(out)
    }
}
