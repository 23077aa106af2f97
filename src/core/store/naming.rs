use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use uuid::Uuid;

use crate::models::RenderRole;

pub const EXTENSION: &str = "jpg";
const TOKEN_LEN: usize = 12;
const MAX_NAME_LEN: usize = 96;

const STAMP: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]_[hour][minute][second]");

/// `<role>_<YYYYMMDD_HHMMSS>_<token>.jpg`, timestamp in UTC.
pub fn route_filename(role: RenderRole, at: OffsetDateTime) -> Result<String, time::error::Format> {
    let stamp = at.to_offset(UtcOffset::UTC).format(STAMP)?;
    Ok(format!("{}_{}_{}.{}", role.prefix(), stamp, random_token(), EXTENSION))
}

fn random_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}

/// Whether `name` may be served from the route directory: a bare
/// `blue_*.jpg` filename with no path components.
pub fn is_safe_route_name(name: &str) -> bool {
    has_role(name, RenderRole::Accepted)
        && name.len() <= MAX_NAME_LEN
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub fn has_role(name: &str, role: RenderRole) -> bool {
    name.strip_prefix(role.prefix())
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(EXTENSION))
        .is_some_and(|rest| rest.ends_with('.'))
}

/// Recover the creation time from a generated filename.
pub fn parse_timestamp(name: &str) -> Option<OffsetDateTime> {
    let stem = name.strip_suffix(EXTENSION)?.strip_suffix('.')?;
    let mut parts = stem.splitn(4, '_');
    let _role = parts.next()?;
    let date = parts.next()?;
    let clock = parts.next()?;
    let stamp = format!("{date}_{clock}");
    PrimitiveDateTime::parse(&stamp, STAMP)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}
