pub mod domain;
pub mod flow;
pub mod passkey;
pub mod policy;
pub mod principal;
pub mod relation;
pub mod role;
pub mod service_user;
pub mod session;
pub mod user;

pub use domain::{Domain, DomainState};
pub use flow::{AuthMethod, Flow};
pub use passkey::PasskeyUserData;
pub use policy::{Policy, PolicyFilter};
pub use principal::Principal;
pub use relation::{Object, Relation, RelationFilter, Subject};
pub use role::Role;
pub use service_user::{Jwk, ServiceUser, ServiceUserCredential, ServiceUserState};
pub use session::Session;
pub use user::{User, UserState};
