//! Input containers handed over by the lifter and CFG-recovery stages.

pub mod containers;
