//! Checks for the Flask API application.
//!
//! Python is case-sensitive, so identifier lookups here use plain
//! substring tests; only the route and call patterns go through regex.

use crate::context::VerificationContext;
use crate::error::RuleError;
use crate::rules::catalog::{CheckResult, Finding};
use crate::rules::matchers;

const REQUIRED_IMPORTS: &[(&str, &[&str])] = &[
    ("flask", &["Flask", "jsonify", "request"]),
    ("subprocess", &[]),
];

pub fn required_imports(ctx: &VerificationContext) -> CheckResult {
    let text = &ctx.content;
    let mut missing = Vec::new();
    for (module, names) in REQUIRED_IMPORTS {
        let imported =
            text.contains(&format!("from {module} import")) || text.contains(&format!("import {module}"));
        if !imported {
            missing.push(module.to_string());
            continue;
        }
        for name in *names {
            if !text.contains(name) {
                missing.push(format!("{module}.{name}"));
            }
        }
    }
    if missing.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(format!(
        "Missing recommended imports: {}",
        missing.join(", ")
    ))])
}

pub fn app_init(ctx: &VerificationContext) -> CheckResult {
    if ctx.content.contains("Flask(__name__)") {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(
        "Flask app not initialized with Flask(__name__)",
    )])
}

pub fn debug_mode(ctx: &VerificationContext) -> CheckResult {
    let re = matchers::compile_exact(r#"debug\s*=\s*True|\[\s*['"]DEBUG['"]\s*\]\s*=\s*True"#)?;
    if re.is_match(&ctx.content) {
        return Ok(vec![Finding::violation(
            "Debug mode enabled - ensure this is disabled in production",
        )]);
    }
    Ok(vec![])
}

pub fn host_binding(ctx: &VerificationContext) -> CheckResult {
    if ctx.content.contains("0.0.0.0") {
        return Ok(vec![Finding::note(
            "App configured to listen on all interfaces (0.0.0.0)",
        )]);
    }
    let local = matchers::compile(r#"host\s*=\s*['"](127\.0\.0\.1|localhost)['"]"#)?;
    if local.is_match(&ctx.content) {
        return Ok(vec![Finding::violation(
            "App only listening on localhost - may not be accessible remotely",
        )]);
    }
    Ok(vec![])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub methods: String,
}

/// `@app.route('/x', methods=['POST'])`, `@bp.route("/x")`, `@app.get("/x")`.
pub fn routes(text: &str) -> Result<Vec<Route>, RuleError> {
    let re = matchers::compile_exact(
        r#"@\w+\.(route|get|post|put|delete|patch)\(\s*['"]([^'"]+)['"](?:\s*,\s*methods\s*=\s*\[([^\]]+)\])?"#,
    )?;
    Ok(re
        .captures_iter(text)
        .filter_map(|c| {
            let kind = c.get(1)?.as_str();
            let path = c.get(2)?.as_str().to_string();
            let methods = match (kind, c.get(3)) {
                ("route", Some(m)) => m
                    .as_str()
                    .split(',')
                    .map(|s| s.trim().trim_matches(|ch: char| ch == '\'' || ch == '"'))
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(","),
                ("route", None) => "GET".to_string(),
                (verb, _) => verb.to_ascii_uppercase(),
            };
            Some(Route { path, methods })
        })
        .collect())
}

pub fn routes_defined(ctx: &VerificationContext) -> CheckResult {
    let found = routes(&ctx.content)?;
    if found.is_empty() {
        return Ok(vec![Finding::violation("No routes defined in Flask app")]);
    }
    Ok(found
        .iter()
        .map(|r| Finding::note(format!("Route: {} {}", r.methods, r.path)))
        .collect())
}

pub fn expected_endpoints(ctx: &VerificationContext) -> CheckResult {
    let found = routes(&ctx.content)?;
    // No routes at all is already an error of its own.
    if found.is_empty() {
        return Ok(vec![]);
    }
    let missing: Vec<&str> = ctx
        .expected_endpoints
        .iter()
        .map(String::as_str)
        .filter(|ep| !found.iter().any(|r| r.path == *ep))
        .collect();
    if missing.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![Finding::violation(format!(
        "Missing expected endpoints: {}",
        missing.join(", ")
    ))])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub name: String,
    pub body: String,
}

/// Decorated route handlers with their indented bodies.
pub fn route_handlers(text: &str) -> Result<Vec<Handler>, RuleError> {
    let decorator = matchers::compile_exact(r"^\s*@\w+\.(route|get|post|put|delete|patch)\(")?;
    let def = matchers::compile_exact(r"^\s*(?:async\s+)?def\s+(\w+)\s*\(")?;
    let lines: Vec<&str> = text.lines().collect();

    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !decorator.is_match(lines[i]) {
            i += 1;
            continue;
        }
        // Skip stacked decorators down to the def line.
        let mut j = i + 1;
        while j < lines.len() && lines[j].trim_start().starts_with('@') {
            j += 1;
        }
        let Some(name) = lines.get(j).and_then(|l| def.captures(l)).and_then(|c| c.get(1)) else {
            i = j;
            continue;
        };
        let name = name.as_str().to_string();
        let def_indent = indent(lines[j]);
        let mut k = j + 1;
        let mut body = Vec::new();
        while k < lines.len() {
            let line = lines[k];
            if !line.trim().is_empty() && indent(line) <= def_indent {
                break;
            }
            body.push(line);
            k += 1;
        }
        out.push(Handler {
            name,
            body: body.join("\n"),
        });
        i = k;
    }
    Ok(out)
}

fn indent(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

pub fn route_error_handling(ctx: &VerificationContext) -> CheckResult {
    let handlers = route_handlers(&ctx.content)?;
    let issues: Vec<String> = handlers
        .iter()
        .filter_map(|h| {
            let has_try = h.body.contains("try:");
            let json_error = h.body.contains("jsonify") && h.body.contains("error");
            if !has_try {
                Some(format!("{} (no try-except)", h.name))
            } else if !json_error {
                Some(format!("{} (no JSON error response)", h.name))
            } else {
                None
            }
        })
        .collect();
    if issues.is_empty() {
        return Ok(vec![]);
    }
    let shown: Vec<&str> = issues.iter().take(3).map(String::as_str).collect();
    Ok(vec![Finding::violation(format!(
        "Error handling issues in routes: {}",
        shown.join(", ")
    ))])
}

const REQUEST_DATA: &[&str] = &["request.get_json(", "request.json", "request.form", "request.args"];

pub fn command_injection(ctx: &VerificationContext) -> CheckResult {
    let text = &ctx.content;
    if !text.contains("subprocess") || !REQUEST_DATA.iter().any(|r| text.contains(r)) {
        return Ok(vec![]);
    }
    let mut out = Vec::new();
    if matchers::is_match(text, r"subprocess\.[^\n]*\{[^\n]*\}")? {
        out.push(Finding::violation(
            "Possible command injection risk - ensure user input is sanitized \
             before passing to subprocess",
        ));
    }
    if matchers::is_match(text, r"subprocess\.\w+\([^\n]*shell\s*=\s*True")? {
        out.push(Finding::violation(
            "subprocess called with shell=True in an app that reads request data",
        ));
    }
    Ok(out)
}

pub fn cors(ctx: &VerificationContext) -> CheckResult {
    if ctx.content.contains("CORS") {
        return Ok(vec![Finding::note("CORS is configured")]);
    }
    Ok(vec![Finding::violation(
        "CORS not configured - may cause issues with web frontends",
    )])
}
