//! Server-rendered HTML.
//!
//! Pages are assembled from small string builders. Everything interpolated
//! into markup goes through [`escape`].

use axum::{http::StatusCode, response::Html};
use std::fmt::Write;

use crate::session::{FlashMessage, SessionHandle};
use crate::urls;

const STYLESHEET: &str = "/static/css/teambeat.css";

/// Submits `form[data-api]` with fetch and reloads on `{status:"success"}`.
const ACTION_SCRIPT: &str = r#"
document.addEventListener('submit', async (event) => {
  const form = event.target;
  if (!form.matches('form[data-api]')) return;
  event.preventDefault();
  const resp = await fetch(form.action, {
    method: 'POST',
    headers: { 'Content-Type': 'application/x-www-form-urlencoded' },
    body: new URLSearchParams(new FormData(form)),
    credentials: 'same-origin',
  });
  const body = await resp.json().catch(() => ({}));
  if (body.status === 'success') {
    window.location.reload();
  } else {
    window.alert(body.errorMessage || 'An unknown error occurred.');
  }
});
"#;

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Full page for the current session. Drains pending flash messages.
pub fn page(session: &SessionHandle, title: &str, body: &str) -> Html<String> {
    let messages = session.take_messages();
    Html(layout(title, session.is_authenticated(), &messages, body))
}

/// Standalone error page. Rendered without session context.
pub fn error_page(status: StatusCode, message: &str) -> Html<String> {
    let title = status.canonical_reason().unwrap_or("Error");
    let body = format!(
        "<section class=\"error\"><h1>{code} {title}</h1><p class=\"error-message\">{message}</p>\
         <p><a href=\"{home}\">Back to TeamBeat</a></p></section>",
        code = status.as_u16(),
        title = escape(title),
        message = escape(message),
        home = urls::DASHBOARD.pattern,
    );
    Html(layout(title, false, &[], &body))
}

fn layout(title: &str, authenticated: bool, messages: &[FlashMessage], body: &str) -> String {
    let nav: &[(&str, &str)] = if authenticated {
        &[
            (urls::DASHBOARD.pattern, "Dashboard"),
            (urls::ORGANIZATION_SELECT.pattern, "Organizations"),
            (urls::PROFILE.pattern, "Profile"),
            (urls::LOGOUT.pattern, "Log out"),
        ]
    } else {
        &[
            (urls::LOGIN.pattern, "Log in"),
            (urls::REGISTER.pattern, "Register"),
        ]
    };

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{} | TeamBeat</title><link rel=\"stylesheet\" href=\"{STYLESHEET}\"></head><body>",
        escape(title)
    );
    html.push_str("<nav class=\"topnav\"><a class=\"brand\" href=\"/\">TeamBeat</a><ul>");
    for (href, label) in nav {
        let _ = write!(html, "<li><a href=\"{href}\">{label}</a></li>");
    }
    html.push_str("</ul></nav>");

    if !messages.is_empty() {
        html.push_str("<ul class=\"messages\">");
        for m in messages {
            let _ = write!(
                html,
                "<li class=\"message message-{}\">{}</li>",
                m.level.as_str(),
                escape(&m.text)
            );
        }
        html.push_str("</ul>");
    }

    let _ = write!(
        html,
        "<main>{body}</main><script>{ACTION_SCRIPT}</script></body></html>"
    );
    html
}

// ---------------------------------------------------------------------------
// Form builders
// ---------------------------------------------------------------------------

/// A regular POST form.
pub fn form(action: &str, fields: &str, submit: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{}\">{fields}<button type=\"submit\">{}</button></form>",
        escape(action),
        escape(submit)
    )
}

/// A form posted through the action script instead of a page load.
pub fn action_form(action: &str, fields: &str, submit: &str) -> String {
    format!(
        "<form class=\"inline\" method=\"post\" action=\"{}\" data-api>{fields}\
         <button type=\"submit\">{}</button></form>",
        escape(action),
        escape(submit)
    )
}

/// Single-button [`action_form`] carrying hidden fields.
pub fn action_button(action: &str, fields: &[(&str, &str)], label: &str) -> String {
    let inputs: String = fields.iter().map(|(name, value)| hidden(name, value)).collect();
    action_form(action, &inputs, label)
}

pub fn input(label: &str, name: &str, kind: &str, value: &str) -> String {
    format!(
        "<label>{label}<input type=\"{kind}\" name=\"{name}\" value=\"{value}\"></label>",
        label = escape(label),
        name = escape(name),
        kind = escape(kind),
        value = escape(value),
    )
}

pub fn textarea(label: &str, name: &str, value: &str) -> String {
    format!(
        "<label>{}<textarea name=\"{}\">{}</textarea></label>",
        escape(label),
        escape(name),
        escape(value)
    )
}

pub fn hidden(name: &str, value: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
        escape(name),
        escape(value)
    )
}

/// Drop-down of `(value, label)` pairs.
pub fn select(label: &str, name: &str, options: &[(String, String)]) -> String {
    let items: String = options
        .iter()
        .map(|(value, text)| {
            format!("<option value=\"{}\">{}</option>", escape(value), escape(text))
        })
        .collect();
    format!(
        "<label>{}<select name=\"{}\">{items}</select></label>",
        escape(label),
        escape(name)
    )
}

/// Radio choices of `(value, label, help)`.
pub fn radio_group(name: &str, options: &[(&str, &str, &str)], selected: Option<&str>) -> String {
    let mut html = String::from("<fieldset class=\"choices\">");
    for (value, label, help) in options {
        let checked = if selected == Some(*value) { " checked" } else { "" };
        let _ = write!(
            html,
            "<label class=\"choice choice-{value}\"><input type=\"radio\" name=\"{name}\" \
             value=\"{value}\"{checked}> {label}<small>{help}</small></label>",
            name = escape(name),
            value = escape(value),
            label = escape(label),
            help = escape(help),
        );
    }
    html.push_str("</fieldset>");
    html
}

/// Inline list of form errors.
pub fn errors(problems: &[String]) -> String {
    if problems.is_empty() {
        return String::new();
    }
    let items: String = problems
        .iter()
        .map(|p| format!("<li>{}</li>", escape(p)))
        .collect();
    format!("<ul class=\"form-errors\">{items}</ul>")
}

/// Table with escaped headers. Cells are trusted markup.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut html = String::from("<table><thead><tr>");
    for h in headers {
        let _ = write!(html, "<th>{}</th>", escape(h));
    }
    html.push_str("</tr></thead><tbody>");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{cell}</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

pub fn link(href: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape(href), escape(label))
}
