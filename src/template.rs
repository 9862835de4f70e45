//! Template rendering for chat replies and the context document skeleton.

use minijinja::Environment;
use serde::Serialize;

const TEMPLATES: &[(&str, &str)] = &[
    ("context.md", include_str!("templates/context.md.jinja")),
    ("help.md", include_str!("templates/help.md.jinja")),
    ("sessions.md", include_str!("templates/sessions.md.jinja")),
    ("search.md", include_str!("templates/search.md.jinja")),
    ("status.md", include_str!("templates/status.md.jinja")),
];

fn environment() -> anyhow::Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    for (name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// Render a named template with `ctx`.
pub fn render<S: Serialize>(name: &str, ctx: S) -> anyhow::Result<String> {
    let env = environment()?;
    let template = env.get_template(name)?;
    Ok(template.render(ctx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_parses() {
        let env = environment().unwrap();
        for (name, _) in TEMPLATES {
            assert!(env.get_template(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(render("missing.md", minijinja::context! {}).is_err());
    }

    #[test]
    fn context_skeleton_mentions_session_history() {
        let out = render(
            "context.md",
            minijinja::context! { initialized => "2026-01-01T00:00:00Z" },
        )
        .unwrap();
        assert!(out.starts_with("# Shared Copilot Context"));
        assert!(out.contains("## Session History"));
        assert!(out.contains("*Context file initialized: 2026-01-01T00:00:00Z*"));
    }
}
