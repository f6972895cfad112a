//! Name → remote tool lookup, built once per session start.

use std::{collections::HashMap, fmt, sync::Arc};

use design_bridge_core::{RemoteError, ToolArgs, ToolOutput, ToolSpec, ToolTransport};
use tracing::{debug, warn};

use crate::error::{InvokeError, SessionError};

/// One remote-invocable tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    spec: ToolSpec,
    handle: Arc<dyn ToolTransport>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Name, description and input schema as listed by the remote.
    #[must_use]
    pub const fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    /// Execute the tool. Arguments are passed through unvalidated.
    ///
    /// # Errors
    /// Returns the remote failure unchanged.
    pub async fn call(&self, args: ToolArgs) -> Result<ToolOutput, RemoteError> {
        self.handle.call_tool(&self.spec.name, args).await
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Tools offered by the remote, keyed by name. Listing order is preserved.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build the registry from a remote listing.
    ///
    /// Duplicate names keep the first entry.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if the listing is empty.
    pub fn populate(
        listing: Vec<ToolSpec>,
        handle: &Arc<dyn ToolTransport>,
    ) -> Result<Self, SessionError> {
        if listing.is_empty() {
            return Err(SessionError::Configuration(
                "Remote server offered no tools".to_string(),
            ));
        }

        let mut registry = Self::default();
        for spec in listing {
            if registry.index.contains_key(&spec.name) {
                warn!(tool = %spec.name, "Duplicate tool name in listing, keeping the first");
                continue;
            }
            registry
                .index
                .insert(spec.name.clone(), registry.tools.len());
            registry.tools.push(ToolDescriptor {
                spec,
                handle: Arc::clone(handle),
            });
        }

        debug!(count = registry.tools.len(), "Populated tool registry");
        Ok(registry)
    }

    /// List the remote's tools and build the registry from them.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if listing fails or is empty.
    pub async fn fetch(handle: Arc<dyn ToolTransport>) -> Result<Self, SessionError> {
        let listing = handle
            .list_tools()
            .await
            .map_err(|e| SessionError::Configuration(format!("Failed to list tools: {e}")))?;
        Self::populate(listing, &handle)
    }

    /// Find a tool by name.
    ///
    /// # Errors
    /// Returns `InvokeError::NotFound` for unknown names.
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, InvokeError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| InvokeError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(ToolDescriptor::name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    fn transport(names: &[&str]) -> Arc<dyn ToolTransport> {
        Arc::new(FakeTransport::with_tools(names))
    }

    #[test]
    fn lookup_finds_listed_tools() {
        let registry = ToolRegistry::populate(
            vec![
                ToolSpec::new("create_frame", "Create a frame"),
                ToolSpec::new("get_selection", "Read the selection"),
            ],
            &transport(&[]),
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("create_frame").unwrap().name(), "create_frame");
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["create_frame", "get_selection"]
        );
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry =
            ToolRegistry::populate(vec![ToolSpec::new("create_frame", "")], &transport(&[]))
                .unwrap();
        assert_eq!(
            registry.lookup("missing_tool").unwrap_err(),
            InvokeError::NotFound("missing_tool".into())
        );
    }

    #[test]
    fn empty_listing_is_a_configuration_error() {
        let err = ToolRegistry::populate(Vec::new(), &transport(&[])).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn duplicates_keep_first_entry() {
        let registry = ToolRegistry::populate(
            vec![
                ToolSpec::new("create_text", "first"),
                ToolSpec::new("create_text", "second"),
            ],
            &transport(&[]),
        )
        .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("create_text").unwrap().spec().description, "first");
    }

    #[tokio::test]
    async fn fetch_uses_remote_listing() {
        let registry = ToolRegistry::fetch(transport(&["create_frame", "create_text"]))
            .await
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["create_frame", "create_text"]);
    }

    #[tokio::test]
    async fn fetch_failure_is_a_configuration_error() {
        let fake = FakeTransport::with_tools(&["create_frame"]).failing_list(RemoteError::Closed);
        let err = ToolRegistry::fetch(Arc::new(fake)).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Configuration("Failed to list tools: Connection closed".into())
        );
    }
}
