pub mod balance;
pub mod check_mint;
pub mod create_request;
pub mod decode_request;
pub mod decode_token;
pub mod export;
pub mod import;
pub mod receive;
pub mod remove_spent;
pub mod send;
pub mod set_mint;
