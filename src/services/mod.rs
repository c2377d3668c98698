pub mod credential;
pub mod domain;
pub mod email;
pub mod policy;
pub mod reaper;
pub mod role;
pub mod session;
pub mod user;

pub use credential::{
    CredentialService, IssuedKeyCredential, IssuedSecretCredential, ServiceUserClaims,
};
pub use domain::{DnsTxtResolver, DomainService, TxtResolver};
pub use email::{Mailer, SmtpMailer};
pub use policy::PolicyService;
pub use reaper::{Reaper, SweepStats};
pub use role::RoleService;
pub use session::SessionService;
pub use user::UserService;
