//! Email address helpers.

use mailparse::{addrparse, MailAddr};

/// Reduce `"Name <user@host>"` (or a bare address) to `user@host`.
///
/// Case is kept; pool lookups compare addresses case-insensitively.
/// Falls back to the trimmed input when the header cannot be parsed.
pub fn normalize_address(raw: &str) -> String {
    let parsed = addrparse(raw).ok().and_then(|list| {
        list.iter().find_map(|addr| match addr {
            MailAddr::Single(info) => Some(info.addr.clone()),
            MailAddr::Group(group) => group.addrs.first().map(|info| info.addr.clone()),
        })
    });

    parsed.unwrap_or_else(|| raw.trim().to_string())
}
