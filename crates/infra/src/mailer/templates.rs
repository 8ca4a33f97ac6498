use minijinja::{Environment, Value, default_auto_escape_callback};

/// Embedded HTML templates with HTML autoescaping.
pub struct EmailTemplates {
    env: Environment<'static>,
}

impl EmailTemplates {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(default_auto_escape_callback);
        env.set_loader(embedded_template_loader);
        Self { env }
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }
}

impl Default for EmailTemplates {
    fn default() -> Self {
        Self::new()
    }
}

fn embedded_template_loader(name: &str) -> Result<Option<String>, minijinja::Error> {
    let source = match name {
        "base.html" => Some(include_str!("templates/base.html")),
        "verification.html" => Some(include_str!("templates/verification.html")),
        "password_reset.html" => Some(include_str!("templates/password_reset.html")),
        "welcome.html" => Some(include_str!("templates/welcome.html")),
        "password_changed.html" => Some(include_str!("templates/password_changed.html")),
        "account_locked.html" => Some(include_str!("templates/account_locked.html")),
        _ => None,
    };
    Ok(source.map(str::to_string))
}
