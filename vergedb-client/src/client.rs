//! High-level client API.

use crate::config::Config;
use crate::connection::{Connection, State};
use crate::error::ClientError;
use crate::registry;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use vergedb_codec::{
    decode_basic_responses, decode_subscription_id, Object, Patch, RecordId, Request, Value,
    ZeroAsNone,
};

/// High-level client for VergeDB.
///
/// Construction validates the workspace names without touching the network;
/// [`connect`](Client::connect) opens the socket, authenticates and selects
/// the workspace. All operations may be called concurrently.
pub struct Client {
    conn: Arc<Connection>,
}

/// A GraphQL request executed against the database.
#[derive(Debug, Clone, Default)]
pub struct GraphqlRequest {
    /// The query string to execute.
    pub query: String,
    /// Variables to be used in the query.
    pub vars: Option<Object>,
    /// Name of the operation to execute.
    pub operation: Option<String>,
}

impl From<GraphqlRequest> for Value {
    fn from(request: GraphqlRequest) -> Self {
        let mut fields = Object::new();
        fields.insert("query".to_string(), Value::String(request.query));
        if let Some(vars) = request.vars {
            fields.insert("vars".to_string(), Value::Object(vars));
        }
        if let Some(operation) = request.operation {
            fields.insert("operationName".to_string(), Value::String(operation));
        }
        Value::Object(fields)
    }
}

impl Client {
    /// Creates a new client. Fails on invalid workspace names; no connection
    /// is opened.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            conn: Arc::new(Connection::new(config)),
        })
    }

    /// Connects to the server: opens the socket, signs in, selects the
    /// workspace (creating it if needed) and probes the server version.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the session is established.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Current supervisor state.
    pub fn state(&self) -> State {
        self.conn.state()
    }

    /// The server version probed during connect.
    pub fn database_version(&self) -> String {
        self.conn.version()
    }

    /// Closes the connection and drains background tasks.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Bytes, ClientError> {
        self.conn.send(Request::new(method).with_params(params)).await
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Returns version information about the server.
    pub async fn version(&self) -> Result<String, ClientError> {
        let raw = self.send("version", Vec::new()).await?;
        let version = String::try_from(self.decode(&raw)?)?;
        Ok(version
            .strip_prefix("vergedb-")
            .unwrap_or(&version)
            .to_string())
    }

    /// Switches the namespace and database for this connection.
    pub async fn use_workspace(&self, namespace: &str, database: &str) -> Result<(), ClientError> {
        self.send("use", vec![Value::from(namespace), Value::from(database)])
            .await?;
        Ok(())
    }

    /// Signs in as a root, namespace, database or record user. The returned
    /// token is stored on the connection.
    pub async fn signin(&self, username: &str, password: &str) -> Result<(), ClientError> {
        self.conn.signin_with(username, password).await
    }

    /// Signs up a new record user with access-method parameters.
    pub async fn signup(&self, params: Object) -> Result<Bytes, ClientError> {
        self.send("signup", vec![Value::Object(params)]).await
    }

    /// Authenticates with an existing token.
    pub async fn authenticate(&self, token: &str) -> Result<(), ClientError> {
        self.send("authenticate", vec![Value::from(token)]).await?;
        self.conn.set_token(token.to_string());
        Ok(())
    }

    /// Invalidates the current session.
    pub async fn invalidate(&self) -> Result<(), ClientError> {
        self.send("invalidate", Vec::new()).await?;
        self.conn.set_token(String::new());
        Ok(())
    }

    /// Returns information about the authenticated session user.
    pub async fn info(&self) -> Result<Bytes, ClientError> {
        self.send("info", Vec::new()).await
    }

    /// Defines a variable on the current connection.
    pub async fn let_var(&self, name: &str, value: impl Into<Value>) -> Result<(), ClientError> {
        self.send("let", vec![Value::from(name), value.into()]).await?;
        Ok(())
    }

    /// Removes a variable from the current connection.
    pub async fn unset(&self, name: &str) -> Result<(), ClientError> {
        self.send("unset", vec![Value::from(name)]).await?;
        Ok(())
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    /// Creates a record with a random or specified id.
    pub async fn create(&self, id: RecordId, data: Option<Value>) -> Result<Bytes, ClientError> {
        self.send("create", vec![Value::RecordId(id), data.unwrap_or(Value::Null)])
            .await
    }

    /// Inserts one or more records into a table.
    pub async fn insert(&self, table: &str, data: Vec<Value>) -> Result<Bytes, ClientError> {
        self.send("insert", vec![Value::from(table), Value::Array(data)])
            .await
    }

    /// Replaces the addressed record(s) with the specified data.
    pub async fn update(&self, id: RecordId, data: Option<Value>) -> Result<Bytes, ClientError> {
        self.send("update", vec![Value::RecordId(id), data.unwrap_or(Value::Null)])
            .await
    }

    /// Replaces the addressed record(s), creating them if missing.
    pub async fn upsert(&self, id: RecordId, data: Option<Value>) -> Result<Bytes, ClientError> {
        self.send("upsert", vec![Value::RecordId(id), data.unwrap_or(Value::Null)])
            .await
    }

    /// Merges the specified data into the addressed record(s).
    pub async fn merge(&self, id: RecordId, data: Option<Value>) -> Result<Bytes, ClientError> {
        self.send("merge", vec![Value::RecordId(id), data.unwrap_or(Value::Null)])
            .await
    }

    /// Applies JSON-Patch operations to the addressed record(s).
    pub async fn patch(
        &self,
        id: RecordId,
        patches: Vec<Patch>,
        diff: bool,
    ) -> Result<Bytes, ClientError> {
        let patches = patches.into_iter().map(Value::from).collect();
        self.send(
            "patch",
            vec![Value::RecordId(id), Value::Array(patches), Value::Bool(diff)],
        )
        .await
    }

    /// Deletes the addressed record(s).
    pub async fn delete(&self, id: RecordId) -> Result<Bytes, ClientError> {
        self.send("delete", vec![Value::RecordId(id)]).await
    }

    /// Selects the addressed record(s).
    pub async fn select(&self, id: RecordId) -> Result<Bytes, ClientError> {
        self.send("select", vec![Value::RecordId(id)]).await
    }

    /// Creates a graph relationship between two records. Data is only
    /// submitted when present.
    pub async fn relate(
        &self,
        in_id: RecordId,
        relation: RecordId,
        out_id: RecordId,
        data: Option<Value>,
    ) -> Result<Bytes, ClientError> {
        let mut params = vec![
            Value::RecordId(in_id),
            Value::RecordId(relation),
            Value::RecordId(out_id),
        ];
        if let Some(data) = data {
            params.push(data);
        }
        self.send("relate", params).await
    }

    /// Inserts a relation record. When `table` is absent the relation table
    /// is inferred from the data's id field.
    pub async fn insert_relation(
        &self,
        table: Option<&str>,
        data: Value,
    ) -> Result<Bytes, ClientError> {
        let table = table.map(Value::from).unwrap_or(Value::Null);
        self.send("insert_relation", vec![table, data]).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Executes a custom query with optional variables.
    pub async fn query(
        &self,
        sql: impl Into<String>,
        vars: Option<Object>,
    ) -> Result<Bytes, ClientError> {
        self.conn.query_raw(sql.into(), vars).await
    }

    /// Executes a GraphQL query against the database.
    pub async fn graphql(&self, request: GraphqlRequest) -> Result<Bytes, ClientError> {
        self.send("graphql", vec![Value::from(request)]).await
    }

    /// Runs a built-in function, custom function or model with optional
    /// arguments. The version argument is sent as none when absent so the
    /// server distinguishes it from an empty string.
    pub async fn run(
        &self,
        name: &str,
        version: Option<String>,
        args: Vec<Value>,
    ) -> Result<Bytes, ClientError> {
        self.send(
            "run",
            vec![
                Value::from(name),
                Value::from(ZeroAsNone(version.unwrap_or_default())),
                Value::Array(args),
            ],
        )
        .await
    }

    /// Kills an active live query.
    pub async fn kill(&self, subscription_id: &[u8]) -> Result<Bytes, ClientError> {
        self.send("kill", vec![subscription_id_value(subscription_id)])
            .await
    }

    /// Starts a live query and returns a handle receiving its notifications.
    ///
    /// The server runtime does not evaluate bound variables in live-query
    /// filters, so bindings are materialized as uniquely-prefixed params
    /// (`DEFINE PARAM`) and the query is rewritten to reference them before
    /// being submitted through the generic `query` method. Dropping or
    /// killing the returned handle removes the subscription, kills the
    /// server-side query and removes the generated params.
    pub async fn live(
        &self,
        query: &str,
        vars: Option<Object>,
    ) -> Result<LiveQuery, ClientError> {
        let bindings = vars.clone().unwrap_or_default();
        let prefix = registry::var_prefix();
        let (statement, param_names) = rewrite_live_query(&prefix, query, &bindings);

        let raw = self.conn.query_raw(statement, vars).await?;
        let responses = decode_basic_responses(&raw, &self.conn.config.decode_limits)?;

        // The statement after the param definitions carries the live key.
        let result = responses
            .get(param_names.len())
            .ok_or(ClientError::EmptyResponse)?;
        if result.result.is_empty() || result.result.as_ref() == [0xf6] {
            return Err(ClientError::EmptyResponse);
        }

        let id = decode_subscription_id(&result.result, &self.conn.config.decode_limits)?;
        if id.is_empty() {
            return Err(ClientError::EmptyResponse);
        }

        let rx = self
            .conn
            .subscriptions
            .insert(&id)
            .ok_or(ClientError::CouldNotGetLiveQueryChannel)?;

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let conn = Arc::clone(&self.conn);
        let key = id.clone();
        self.conn
            .spawn(async move {
                let mut shutdown = conn.subscribe_shutdown();
                tokio::select! {
                    // The connection is going away; no kill needed.
                    _ = shutdown.changed() => return,
                    _ = cancel_rx => {}
                }

                tracing::debug!(id = ?key, "live query cancelled, cleaning up");
                conn.subscriptions.remove(&key);

                let kill = Request::new("kill").with_params(vec![subscription_id_value(&key)]);
                if let Err(err) = conn.send(kill).await {
                    tracing::error!(id = ?key, error = %err, "could not kill live query");
                }

                for name in param_names {
                    let removal = conn.query_raw(format!("REMOVE PARAM ${name};"), None);
                    if let Err(err) = removal.await {
                        tracing::error!(param = %name, error = %err, "could not remove param");
                    }
                }
            })
            .await;

        Ok(LiveQuery {
            id,
            rx,
            cancel: Some(cancel_tx),
        })
    }

    fn decode(&self, raw: &Bytes) -> Result<Value, ClientError> {
        Ok(vergedb_codec::from_slice(raw, &self.conn.config.decode_limits)?)
    }
}

/// A handle on a running live query.
///
/// Notifications arrive in server emission order. Dropping the handle (or
/// calling [`kill`](LiveQuery::kill)) tears the subscription down: the
/// channel closes, the server-side query is killed and the generated params
/// are removed, best-effort.
pub struct LiveQuery {
    id: Vec<u8>,
    rx: mpsc::Receiver<Bytes>,
    cancel: Option<oneshot::Sender<()>>,
}

impl LiveQuery {
    /// The opaque subscription id issued by the server.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Receives the next notification payload. Returns `None` once the
    /// subscription is closed.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Tears the subscription down now instead of on drop.
    pub fn kill(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Rewrites a live query so its bindings survive the server's param
/// handling: every `$k` becomes `$prefix_k`, defined ahead of the `live`
/// statement. Returns the full statement and the generated param names.
fn rewrite_live_query(prefix: &str, query: &str, vars: &Object) -> (String, Vec<String>) {
    let mut rewritten = query.to_string();
    let mut definitions = String::new();
    let mut param_names = Vec::with_capacity(vars.len());

    for key in vars.keys() {
        let name = format!("{prefix}_{key}");
        definitions.push_str(&format!("DEFINE PARAM ${name} VALUE ${key}; "));
        rewritten = rewritten.replace(&format!("${key}"), &format!("${name}"));
        param_names.push(name);
    }

    (format!("{definitions}live {rewritten}"), param_names)
}

/// Encodes a subscription id the way the server issued it: a 16-byte id
/// goes back as a binary UUID, anything else as text or raw bytes.
fn subscription_id_value(id: &[u8]) -> Value {
    if id.len() == 16 {
        if let Ok(uuid) = Uuid::from_slice(id) {
            return Value::Uuid(uuid);
        }
    }
    match std::str::from_utf8(id) {
        Ok(text) => Value::String(text.to_owned()),
        Err(_) => Value::Bytes(Bytes::copy_from_slice(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_client_creation() {
        let config = Config::new("localhost:8000", "root", "root", "test_ns", "test_db");
        let client = Client::new(config).unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.database_version(), "");
    }

    #[test]
    fn test_invalid_names_fail_construction() {
        let config = Config::new("localhost:8000", "root", "root", "bad-name", "db");
        assert!(matches!(
            Client::new(config),
            Err(ClientError::InvalidNamespaceName(_))
        ));

        let config = Config::new("localhost:8000", "root", "root", "ns", "bad name");
        assert!(matches!(
            Client::new(config),
            Err(ClientError::InvalidDatabaseName(_))
        ));
    }

    #[test]
    fn test_rewrite_live_query() {
        let mut vars = Object::new();
        vars.insert("a".to_string(), Value::from(1i64));
        vars.insert("b".to_string(), Value::from(2i64));

        let (statement, names) = rewrite_live_query(
            "pfx",
            "select * from some where x in $a and y = $b",
            &vars,
        );

        assert_eq!(names, vec!["pfx_a".to_string(), "pfx_b".to_string()]);
        assert_eq!(
            statement,
            "DEFINE PARAM $pfx_a VALUE $a; DEFINE PARAM $pfx_b VALUE $b; \
             live select * from some where x in $pfx_a and y = $pfx_b"
        );
    }

    #[test]
    fn test_rewrite_live_query_without_vars() {
        let (statement, names) = rewrite_live_query("pfx", "select * from some", &Object::new());
        assert!(names.is_empty());
        assert_eq!(statement, "live select * from some");
    }

    #[test]
    fn test_subscription_id_value_forms() {
        let uuid_id = [7u8; 16];
        assert!(matches!(
            subscription_id_value(&uuid_id),
            Value::Uuid(uuid) if uuid.as_bytes() == &uuid_id
        ));

        assert_eq!(
            subscription_id_value(b"text-id"),
            Value::String("text-id".to_string())
        );

        let raw = [0xffu8, 0xfe, 0x01];
        assert!(matches!(subscription_id_value(&raw), Value::Bytes(_)));
    }

    #[test]
    fn test_graphql_request_value() {
        let mut vars = Object::new();
        vars.insert("id".to_string(), Value::from(1i64));
        let request = GraphqlRequest {
            query: "{ user { name } }".to_string(),
            vars: Some(vars),
            operation: None,
        };

        let value = Value::from(request);
        assert_eq!(
            value.get("query").and_then(Value::as_str),
            Some("{ user { name } }")
        );
        assert!(value.get("vars").is_some());
        assert!(value.get("operationName").is_none());
    }
}
