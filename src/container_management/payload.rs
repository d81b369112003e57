//! Static landing page served by each tenant container.

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders the `index.html` placed in a container's content directory.
pub fn landing_page(owner: &str, container_name: &str, port: u16) -> String {
    let owner = escape_html(owner);
    let container_name = escape_html(container_name);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{owner}'s Container</title>
    <style>
        body {{ font-family: sans-serif; display: flex; align-items: center;
               justify-content: center; min-height: 100vh; margin: 0; }}
        .info {{ text-align: center; padding: 2rem; }}
    </style>
</head>
<body>
    <div class="info">
        <h1>{owner}'s Container</h1>
        <p>Container: {container_name}</p>
        <p><strong>Port:</strong> {port}</p>
    </div>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_names_owner_container_and_port() {
        let page = landing_page("soltani", "site1", 8000);
        assert!(page.contains("<title>soltani's Container</title>"));
        assert!(page.contains("Container: site1"));
        assert!(page.contains("8000"));
    }

    #[test]
    fn markup_in_names_is_escaped() {
        let page = landing_page("<script>", "a&b", 8000);
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("a&amp;b"));
    }
}
