/// Ordered set of named providers. Registration order is attempt order, so
/// cascades walk `iter()` front to back.
#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

pub trait NamedProvider {
    fn name(&self) -> &str;
}

impl<T: NamedProvider> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<T: NamedProvider> ProviderRegistry<T> {
    /// Appends a provider; a provider with the same name is replaced in place.
    pub fn register(&mut self, provider: T) {
        if let Some(slot) = self
            .providers
            .iter_mut()
            .find(|existing| existing.name() == provider.name())
        {
            *slot = provider;
            return;
        }
        self.providers.push(provider);
    }

    pub fn names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.providers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{NamedProvider, ProviderRegistry};

    #[derive(Clone, Debug)]
    struct DummyProvider {
        name: String,
        tag: u8,
    }

    impl NamedProvider for DummyProvider {
        fn name(&self) -> &str {
            self.name.as_str()
        }
    }

    fn dummy(name: &str, tag: u8) -> DummyProvider {
        DummyProvider {
            name: name.to_string(),
            tag,
        }
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = ProviderRegistry::default();
        registry.register(dummy("classifier", 1));
        registry.register(dummy("openai", 2));
        registry.register(dummy("heuristic", 3));

        assert_eq!(
            registry.names(),
            vec![
                "classifier".to_string(),
                "openai".to_string(),
                "heuristic".to_string()
            ]
        );
        let tags = registry.iter().map(|p| p.tag).collect::<Vec<_>>();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn re_registering_replaces_in_place() {
        let mut registry = ProviderRegistry::default();
        registry.register(dummy("a", 1));
        registry.register(dummy("b", 2));
        registry.register(dummy("a", 9));
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        let tags = registry.iter().map(|p| p.tag).collect::<Vec<_>>();
        assert_eq!(tags, vec![9, 2]);
    }
}
