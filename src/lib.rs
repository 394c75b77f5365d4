cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;

        pub use linux::*;

        pub mod tui;
    }
}

pub mod message;
pub mod mt19937;
pub mod pattern;
