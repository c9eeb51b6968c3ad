use fluent_bundle::{FluentArgs, FluentBundle, FluentResource, FluentValue};
use unic_langid::LanguageIdentifier;

/// Built-in catalogs; unsupported tags fall back to en-GB.
fn ftl_source(lang: &str) -> &'static str {
    match lang {
        "en-GB" | "en" => include_str!("../i18n/en-GB.ftl"),
        _ => include_str!("../i18n/en-GB.ftl"),
    }
}

/// User-facing message catalog for the CLI surface.
pub struct Messages {
    bundle: FluentBundle<FluentResource>,
}

impl Messages {
    pub fn for_lang(lang: &str) -> Self {
        let langid: LanguageIdentifier =
            lang.parse().unwrap_or_else(|_| "en-GB".parse().expect("builtin language tag"));
        let resource =
            FluentResource::try_new(ftl_source(lang).to_owned()).expect("builtin FTL parses");
        let mut bundle = FluentBundle::new(vec![langid]);
        // Plain terminal output: no bidi isolation marks around placeables.
        bundle.set_use_isolating(false);
        bundle.add_resource(resource).expect("builtin FTL resource");
        Messages { bundle }
    }

    /// Format `code` with named args. Falls back to the code itself when the
    /// message is unknown or fails to format.
    pub fn get(&self, code: &str, args: &[(&str, String)]) -> String {
        let Some(message) = self.bundle.get_message(code) else {
            return code.to_string();
        };
        let Some(pattern) = message.value() else {
            return code.to_string();
        };
        let mut fluent_args = FluentArgs::new();
        for (key, value) in args {
            fluent_args.set(*key, FluentValue::from(value.as_str()));
        }
        let mut errors = vec![];
        let formatted =
            self.bundle.format_pattern(pattern, Some(&fluent_args), &mut errors).to_string();
        if errors.is_empty() {
            formatted
        } else {
            code.to_string()
        }
    }
}
