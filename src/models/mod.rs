pub mod disputemodel;
pub mod jobmodel;
pub mod usermodel;
pub mod walletmodel;
