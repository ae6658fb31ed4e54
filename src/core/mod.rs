// Math conversions and generational handles shared by the engine modules

pub mod handle;
pub mod math;
