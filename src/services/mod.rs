pub mod genmodel;
pub mod imaging;
pub mod retry;
pub mod storage;
pub mod worker;
