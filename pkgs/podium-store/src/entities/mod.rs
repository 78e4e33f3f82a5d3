//! Sea-ORM entities for podium-store

pub mod conversation_members;
pub mod conversations;
pub mod messages;
pub mod notifications;
pub mod presence;
pub mod users;

pub use conversation_members::Entity as ConversationMembers;
pub use conversations::Entity as Conversations;
pub use messages::Entity as Messages;
pub use notifications::Entity as Notifications;
pub use presence::Entity as Presence;
pub use users::Entity as Users;
