mod account;

pub use account::{cmd_activate, cmd_forget, cmd_login, cmd_register, cmd_show};
