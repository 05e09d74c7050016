pub mod flame;
