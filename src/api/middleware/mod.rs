pub mod auth;

pub use auth::{AgentIdentity, admin_auth, agent_auth};
