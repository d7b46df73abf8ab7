//! Conflict resolution.
//!
//! A conflict is a remote change racing an unpushed local change to the
//! same object. The resolver picks which of the two versions survives.

use crate::object::Object;

/// Chooses the winning version of a conflicting object.
///
/// Implementations must return one of the two references they were given
/// and must not have side effects. The engine identifies the winner by
/// reference identity and rejects anything else.
pub trait ConflictResolver: Send + Sync {
    /// Picks between the server's version and the client's version.
    fn resolve<'a>(&self, server: &'a Object, client: &'a Object) -> &'a Object;
}

/// Which side a resolver chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The remote version.
    Server,
    /// The local version.
    Client,
}

/// Runs a resolver and reports which side won.
///
/// Returns `None` if the resolver returned neither candidate.
pub fn decide(resolver: &dyn ConflictResolver, server: &Object, client: &Object) -> Option<Winner> {
    let chosen = resolver.resolve(server, client);
    if std::ptr::eq(chosen, server) {
        Some(Winner::Server)
    } else if std::ptr::eq(chosen, client) {
        Some(Winner::Client)
    } else {
        None
    }
}

/// The server version always wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferServer;

impl ConflictResolver for PreferServer {
    fn resolve<'a>(&self, server: &'a Object, _client: &'a Object) -> &'a Object {
        server
    }
}

/// The client version always wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferClient;

impl ConflictResolver for PreferClient {
    fn resolve<'a>(&self, _server: &'a Object, client: &'a Object) -> &'a Object {
        client
    }
}

/// The more recently updated version wins; ties go to the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferLatest;

impl ConflictResolver for PreferLatest {
    fn resolve<'a>(&self, server: &'a Object, client: &'a Object) -> &'a Object {
        if client.updated_at > server.updated_at {
            client
        } else {
            server
        }
    }
}

/// A resolver backed by a closure. Build one with [`resolver_fn`].
pub struct FnResolver<F>(F);

impl<F> ConflictResolver for FnResolver<F>
where
    F: for<'a> Fn(&'a Object, &'a Object) -> &'a Object + Send + Sync,
{
    fn resolve<'a>(&self, server: &'a Object, client: &'a Object) -> &'a Object {
        (self.0)(server, client)
    }
}

/// Wraps a closure as a [`ConflictResolver`].
///
/// ```
/// use objsync_protocol::{resolver_fn, Object};
///
/// let resolver = resolver_fn(|server: &Object, client: &Object| {
///     if client.fields.contains_key("pinned") { client } else { server }
/// });
/// # let _ = resolver;
/// ```
pub fn resolver_fn<F>(f: F) -> FnResolver<F>
where
    F: for<'a> Fn(&'a Object, &'a Object) -> &'a Object + Send + Sync,
{
    FnResolver(f)
}
