pub use minijinja::{path_loader, Environment, Value};
pub use minijinja_autoreload::AutoReloader;
pub use minijinja_contrib;
pub use minijinja_embed;
use std::sync::Arc;

use crate::utils::text::truncate_chars;

pub trait ProvidesTemplateEngine {
    fn template_engine(&self) -> &Arc<TemplateEngine>;
}

/// Debug builds reload templates from disk on change; release builds use
/// the copies embedded by `minijinja_embed`.
#[derive(Clone)]
pub enum TemplateEngine {
    #[cfg(debug_assertions)]
    AutoReload(Arc<AutoReloader>),
    #[cfg(not(debug_assertions))]
    Embedded(Arc<Environment<'static>>),
}

/// `{{ text | excerpt(500) }}`: cuts on characters, never inside a CJK glyph.
fn excerpt(value: &str, max_chars: Option<usize>) -> String {
    truncate_chars(value, max_chars.unwrap_or(500))
}

/// `{{ score | percent }}` renders a 0..1 similarity as `87%`.
fn percent(value: f64) -> String {
    format!("{:.0}%", value.clamp(0.0, 1.0) * 100.0)
}

/// Contrib helpers plus the filters the chat templates use.
pub fn configure_environment(env: &mut Environment<'static>) {
    minijinja_contrib::add_to_environment(env);
    env.add_filter("excerpt", excerpt);
    env.add_filter("percent", percent);
}

/// Builds a [`TemplateEngine`] for the calling crate. `$relative_path` is
/// resolved against the caller's manifest dir in debug builds.
#[macro_export]
macro_rules! create_template_engine {
    ($relative_path:expr) => {{
        use $crate::utils::template_engine as engine;

        #[cfg(debug_assertions)]
        {
            let templates =
                std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join($relative_path);
            let reloader = engine::AutoReloader::new(move |notifier| {
                notifier.set_fast_reload(true);
                notifier.watch_path(&templates, true);
                let mut env = engine::Environment::new();
                env.set_loader(engine::path_loader(&templates));
                engine::configure_environment(&mut env);
                Ok(env)
            });
            engine::TemplateEngine::AutoReload(std::sync::Arc::new(reloader))
        }
        #[cfg(not(debug_assertions))]
        {
            let mut env = engine::Environment::new();
            engine::minijinja_embed::load_templates!(&mut env);
            engine::configure_environment(&mut env);
            engine::TemplateEngine::Embedded(std::sync::Arc::new(env))
        }
    }};
}

impl TemplateEngine {
    fn with_env<R>(
        &self,
        f: impl FnOnce(&Environment<'static>) -> Result<R, minijinja::Error>,
    ) -> Result<R, minijinja::Error> {
        match self {
            #[cfg(debug_assertions)]
            Self::AutoReload(reloader) => f(&*reloader.acquire_env()?),
            #[cfg(not(debug_assertions))]
            Self::Embedded(env) => f(env),
        }
    }

    pub fn render(&self, name: &str, ctx: &Value) -> Result<String, minijinja::Error> {
        self.with_env(|env| env.get_template(name)?.render(ctx))
    }

    /// Renders a single `{% block %}` of `template_name`, for htmx swaps.
    pub fn render_block(
        &self,
        template_name: &str,
        block_name: &str,
        context: &Value,
    ) -> Result<String, minijinja::Error> {
        self.with_env(|env| {
            env.get_template(template_name)?
                .eval_to_state(context)?
                .render_block(block_name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_filters_are_registered() {
        let mut env = Environment::new();
        configure_environment(&mut env);
        env.add_template("t", "{{ text | excerpt(3) }} {{ score | percent }}")
            .expect("template");
        let rendered = env
            .get_template("t")
            .and_then(|t| t.render(minijinja::context! { text => "劳动合同期限", score => 0.873 }))
            .expect("render");
        assert_eq!(rendered, "劳动合... 87%");
    }
}
