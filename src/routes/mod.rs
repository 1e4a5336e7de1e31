mod auth;
mod health_check;
mod members;

pub use auth::{
    check_verification_code, login, logout_member, refresh, send_verification_email, signup,
    social_login,
};
pub use health_check::health_check;
pub use members::{check_member, get_member, get_my_info, update_password, update_profile};
