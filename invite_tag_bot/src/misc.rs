use std::fmt::Write;

use teloxide::types::User;

/// Tries to print the user in the prettiest way possible, with either `@username` or full name
/// that hopefully links to the user if `with_link_formatting` is `true`. Optionally allows including user ID.
#[must_use]
pub fn user_name_prettyprint(user: &User, with_id: bool, with_link_formatting: bool) -> String {
    let mut name = match &user.username {
        Some(username) => format!("@{username}"),
        None if with_link_formatting => format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            user.id,
            html_escape::encode_text(&user.full_name())
        ),
        None => user.full_name(),
    };

    if with_id {
        let _ = write!(name, " (userid {})", user.id);
    }

    name
}
