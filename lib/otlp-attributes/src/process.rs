//! OTLP `process` semantic conventions.

use opentelemetry_semantic_conventions::resource::{
    PROCESS_COMMAND, PROCESS_COMMAND_LINE, PROCESS_EXECUTABLE_NAME, PROCESS_EXECUTABLE_PATH,
};

use crate::tags::Tag;

/// Process attributes collected from a resource.
#[derive(Debug, Default)]
pub(crate) struct ProcessAttributes<'a> {
    executable_name: Option<&'a str>,
    executable_path: Option<&'a str>,
    command: Option<&'a str>,
    command_line: Option<&'a str>,
}

impl<'a> ProcessAttributes<'a> {
    /// Records `value` if `key` is one of the process attributes. Returns `true` if it was.
    pub fn observe(&mut self, key: &str, value: &'a str) -> bool {
        let slot = match key {
            PROCESS_EXECUTABLE_NAME => &mut self.executable_name,
            PROCESS_EXECUTABLE_PATH => &mut self.executable_path,
            PROCESS_COMMAND => &mut self.command,
            PROCESS_COMMAND_LINE => &mut self.command_line,
            _ => return false,
        };
        *slot = Some(value).filter(|v| !v.is_empty());
        true
    }

    /// Returns the single most specific process tag, if any.
    ///
    /// Only one process identifier is reported, picked from executable name, executable path, command and command
    /// line, in that order.
    pub fn extract_tag(&self) -> Option<Tag> {
        [
            (PROCESS_EXECUTABLE_NAME, self.executable_name),
            (PROCESS_EXECUTABLE_PATH, self.executable_path),
            (PROCESS_COMMAND, self.command),
            (PROCESS_COMMAND_LINE, self.command_line),
        ]
        .into_iter()
        .find_map(|(key, value)| value.map(|v| Tag::from_key_value(key, v)))
    }
}
