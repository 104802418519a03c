pub mod dashboard;
pub mod sidebar;
