// chatline-common: wire types shared by the chatline hub and its clients

pub mod protocol;
pub mod types;
