use devdash_core::{ServiceStatus, ServiceView};
use std::fmt::Write;

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Dev Dashboard</title>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 1200px; margin: 40px auto; padding: 20px; }
        h1 { color: #0078d4; }
        .service { background: #f5f5f5; padding: 15px; margin: 10px 0; border-radius: 8px; }
        .status { display: inline-block; width: 12px; height: 12px; border-radius: 50%; margin-right: 8px; }
        .ready { background: #107c10; }
        .starting { background: #ffb900; }
        .stopped { background: #8a8886; }
        .error { background: #d13438; }
        a { color: #0078d4; text-decoration: none; }
        a:hover { text-decoration: underline; }
    </style>
</head>
<body>
"#;

/// Minimal self-contained page listing `services`, served when no built UI exists.
pub fn render_fallback(project_name: &str, services: &[ServiceView]) -> String {
    let mut page = String::with_capacity(PAGE_HEAD.len() + services.len() * 320);
    page.push_str(PAGE_HEAD);
    let _ = writeln!(page, "    <h1>{}</h1>", escape(project_name));
    page.push_str("    <p>Services in this project</p>\n");

    if services.is_empty() {
        page.push_str("    <p>No services are currently running.</p>\n");
    }
    for service in services {
        render_service(&mut page, service);
    }

    page.push_str(
        "    <hr>\n    <p style=\"color: #666; font-size: 14px;\"><a href=\"/api/services\">View JSON</a></p>\n</body>\n</html>\n",
    );
    page
}

fn render_service(page: &mut String, service: &ServiceView) {
    let name = escape(&service.name);
    let _ = writeln!(page, "    <div class=\"service\">");
    let _ = writeln!(
        page,
        "        <h3><span class=\"status {}\"></span>{name}</h3>",
        status_class(service.status)
    );
    if service.url.is_empty() {
        page.push_str("        <p><strong>URL:</strong> not assigned</p>\n");
    } else {
        let url = escape(&service.url);
        let _ = writeln!(
            page,
            "        <p><strong>URL:</strong> <a href=\"{url}\" target=\"_blank\">{url}</a></p>"
        );
    }
    if let Some(azure_url) = &service.azure_url {
        let azure_url = escape(azure_url);
        let _ = writeln!(
            page,
            "        <p><strong>Azure:</strong> <a href=\"{azure_url}\" target=\"_blank\">{azure_url}</a></p>"
        );
    }
    if service.language.is_some() || service.framework.is_some() {
        let _ = writeln!(
            page,
            "        <p><strong>Framework:</strong> {} ({})</p>",
            escape(service.framework.as_deref().unwrap_or("-")),
            escape(service.language.as_deref().unwrap_or("-"))
        );
    }
    let _ = writeln!(
        page,
        "        <p><strong>Status:</strong> {} | <strong>Health:</strong> {}</p>",
        service.status,
        escape(service.health.as_deref().unwrap_or("unknown"))
    );
    if let Some(pid) = service.pid {
        let _ = writeln!(page, "        <p><strong>PID:</strong> {pid}</p>");
    }
    if let Some(error) = &service.error {
        let _ = writeln!(page, "        <p><strong>Error:</strong> {}</p>", escape(error));
    }
    if let Some(started) = service.start_time {
        let _ = writeln!(
            page,
            "        <p><strong>Started:</strong> {}</p>",
            started.to_rfc2822()
        );
    }
    page.push_str("    </div>\n");
}

fn status_class(status: ServiceStatus) -> &'static str {
    match status {
        status if status.is_up() => "ready",
        ServiceStatus::Error => "error",
        ServiceStatus::Stopped | ServiceStatus::Stopping => "stopped",
        _ => "starting",
    }
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::ServiceRecord;

    #[test]
    fn empty_page_says_nothing_is_running() {
        let page = render_fallback("shop", &[]);
        assert!(page.contains("<h1>shop</h1>"));
        assert!(page.contains("No services are currently running."));
    }

    #[test]
    fn services_are_listed_with_status_class() {
        let mut record = ServiceRecord::new("api", ServiceStatus::Running)
            .with_url("http://localhost:3000", 3000);
        record.pid = Some(4242);
        let page = render_fallback("shop", &[ServiceView::from(&record)]);
        assert!(page.contains("api"));
        assert!(page.contains("status ready"));
        assert!(page.contains("<strong>PID:</strong> 4242"));
        assert!(page.contains("href=\"http://localhost:3000\""));
        assert!(!page.contains("No services are currently running."));
    }

    #[test]
    fn names_are_escaped() {
        let record = ServiceRecord::new("<script>", ServiceStatus::Error);
        let page = render_fallback("a&b", &[ServiceView::from(&record)]);
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("a&amp;b"));
        assert!(!page.contains("<script>"));
    }
}
