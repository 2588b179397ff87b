/// Plugin descriptor: the `plugin.yml` shipped inside every plugin archive.
///
/// The core only needs `name`; the other fields are kept for operator
/// listings and validation.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    /// Entry-point class, dotted.
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub depend: Vec<String>,
}

impl PluginDescriptor {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let descriptor: PluginDescriptor = serde_yaml::from_str(raw)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Validate the descriptor for required fields.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Plugin descriptor missing 'name'");
        }
        if self.name.contains(char::is_whitespace) {
            anyhow::bail!("Plugin name '{}' contains whitespace", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_descriptor() {
        let d = PluginDescriptor::parse("name: Essentials\nmain: com.earth2me.Essentials\nversion: '2.20'\n").unwrap();
        assert_eq!(d.name, "Essentials");
        assert_eq!(d.version.as_deref(), Some("2.20"));
        assert!(d.authors.is_empty());
    }

    #[test]
    fn test_name_is_required() {
        assert!(PluginDescriptor::parse("main: a.B\n").is_err());
        assert!(PluginDescriptor::parse("name: 'Two Words'\n").is_err());
    }
}
