mod activity;
mod controls;
mod details;
mod panels;
