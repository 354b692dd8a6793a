//! Configuration access port trait.
//!
//! Raw string access only; typed parsing and defaults live in
//! `domain::config`.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Section names present in the source.
    fn sections(&self) -> Vec<String>;

    /// Keys present in `section`, empty if the section is absent.
    fn keys(&self, section: &str) -> Vec<String>;
}
