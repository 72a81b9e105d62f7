pub mod battery;
pub mod encoder;
pub mod icm42688;
pub mod led;
pub mod motor;
