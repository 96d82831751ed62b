pub mod auth;
pub mod bootstrap;
pub mod category_reconciler;
pub mod commands;
pub mod kanban;
pub mod pomodoro;
