//! Helpers for failures that must not interrupt a collection cycle.

pub trait ResultOkLogExt<T> {
    /// Logs the error at error level and discards it.
    fn ok_log(self) -> Option<T>;

    /// Logs the error at `level`, prefixed with `context`, and discards it.
    fn ok_log_at(self, level: log::Level, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        self.map_err(|err| log::error!("{err}")).ok()
    }

    fn ok_log_at(self, level: log::Level, context: &str) -> Option<T> {
        self.map_err(|err| log::log!(level, "{context}: {err}")).ok()
    }
}
