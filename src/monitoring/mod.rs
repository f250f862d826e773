pub mod capture;
pub mod compare;
pub mod export;
pub mod telegram;
