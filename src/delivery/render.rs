//! Markdown to e-mail HTML.

use chrono::NaiveDate;
use comrak::{Options, markdown_to_html as comrak_to_html};

/// Render Markdown to an HTML fragment. Raw HTML in the input is escaped.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    comrak_to_html(markdown, &options)
}

/// A complete HTML document for the digest body.
pub fn email_html(subject: &str, date: NaiveDate, markdown: &str) -> String {
    let body = markdown_to_html(markdown);
    let title = escape(subject);
    let date = date.format("%B %d, %Y");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; line-height: 1.6; color: #222; background: #f4f4f4; margin: 0; padding: 0; }}
.container {{ max-width: 640px; margin: 20px auto; background: #fff; padding: 24px 32px; border-radius: 6px; }}
.header {{ border-bottom: 2px solid #3a6ea5; margin-bottom: 16px; }}
.header h1 {{ font-size: 22px; margin: 0 0 4px; }}
.header p {{ color: #666; margin: 0 0 12px; font-size: 14px; }}
a {{ color: #3a6ea5; }}
h2 {{ font-size: 18px; border-bottom: 1px solid #eee; padding-bottom: 4px; }}
.footer {{ color: #888; font-size: 12px; margin-top: 24px; border-top: 1px solid #eee; padding-top: 12px; }}
</style>
</head>
<body>
<div class="container">
<div class="header">
<h1>{title}</h1>
<p>{date}</p>
</div>
{body}<div class="footer">
<p>You are receiving this digest because you subscribed to it.</p>
</div>
</div>
</body>
</html>
"#
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
