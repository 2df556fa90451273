pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod tasks {
    #[cfg(unix)]
    pub mod control;
    pub mod scheduler;
    pub mod synchronizer;
    pub mod timer;
    pub mod viewer;
}
