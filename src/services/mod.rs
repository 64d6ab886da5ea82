pub mod account_service;
pub use account_service::{Account, AccountError, AccountService, AccountUpdate, NewAccount};

pub mod account_service_impl;
pub use account_service_impl::SeaOrmAccountService;
