pub mod db;
pub mod disputedb;
pub mod jobdb;
pub mod userdb;
pub mod walletdb;
