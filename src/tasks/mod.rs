pub mod battery_task;
pub mod inner_loop;
pub mod outer_loop;
pub mod telemetry_task;
