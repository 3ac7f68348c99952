// src/common/i18n.rs

use std::collections::HashMap;

use anyhow::Context;

pub const DEFAULT_LANG: &str = "en";

// Catálogos embutidos no binário
const CATALOGS: [(&str, &str); 2] = [
    ("en", include_str!("../../locales/en.json")),
    ("pt", include_str!("../../locales/pt.json")),
];

/// Mensagens traduzidas por idioma, com interpolação de `{placeholder}`.
#[derive(Debug, Clone)]
pub struct I18nStore {
    catalogs: HashMap<String, HashMap<String, String>>,
}

impl I18nStore {
    pub fn load() -> anyhow::Result<Self> {
        let mut catalogs = HashMap::new();
        for (lang, raw) in CATALOGS {
            let messages: HashMap<String, String> = serde_json::from_str(raw)
                .with_context(|| format!("Catálogo de mensagens '{lang}' inválido"))?;
            catalogs.insert(lang.to_string(), messages);
        }
        Ok(Self { catalogs })
    }

    /// Procura a chave no idioma pedido, depois no padrão; sem tradução, devolve a própria chave.
    pub fn translate(&self, lang: &str, key: &str, args: &[(&str, String)]) -> String {
        let template = self
            .lookup(lang, key)
            .or_else(|| self.lookup(DEFAULT_LANG, key))
            .unwrap_or(key);

        args.iter().fold(template.to_string(), |message, (name, value)| {
            message.replace(&format!("{{{name}}}"), value)
        })
    }

    fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        self.catalogs
            .get(lang)
            .and_then(|messages| messages.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_placeholders() {
        let store = I18nStore::load().unwrap();
        let msg = store.translate("en", "errors.adjustment_not_found", &[("id", "42".into())]);
        assert!(msg.contains("42"));
        assert!(!msg.contains("{id}"));
    }

    #[test]
    fn falls_back_to_default_language_then_key() {
        let store = I18nStore::load().unwrap();
        assert_eq!(
            store.translate("de", "errors.internal", &[]),
            store.translate(DEFAULT_LANG, "errors.internal", &[])
        );
        assert_eq!(store.translate("pt", "no.such.key", &[]), "no.such.key");
    }

    #[test]
    fn catalogs_define_the_same_keys() {
        let store = I18nStore::load().unwrap();
        let mut en: Vec<_> = store.catalogs["en"].keys().collect();
        let mut pt: Vec<_> = store.catalogs["pt"].keys().collect();
        en.sort();
        pt.sort();
        assert_eq!(en, pt);
    }
}
