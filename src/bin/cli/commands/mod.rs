pub mod decrypt;
pub mod keygen;
pub mod run;
pub mod status;
