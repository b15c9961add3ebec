use std::{collections::HashSet, fmt};

use crate::{Config, Error};

/// Certificate request subject derived from the configuration.
///
/// The first configured domain is the common name; every domain (the common name included)
/// is requested as a subject alternative name, first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub common_name: String,
    pub hosts: Vec<String>,
    pub organization: String,
    pub country: String,
    pub locality: String,
    pub province: String,
}

impl Subject {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let common_name = config
            .domains
            .first()
            .ok_or_else(|| Error::config("at least one domain is required"))?
            .clone();

        let mut seen = HashSet::new();
        let hosts = config
            .domains
            .iter()
            .filter(|domain| seen.insert(*domain))
            .cloned()
            .collect();

        Ok(Subject {
            common_name,
            hosts,
            organization: config.organization.clone(),
            country: config.country.clone(),
            locality: config.locality.clone(),
            province: config.province.clone(),
        })
    }

    /// Returns true if `names` is the same set of names this subject requests.
    pub fn covers_exactly<S: AsRef<str>>(&self, names: &[S]) -> bool {
        let wanted = self.hosts.iter().map(String::as_str).collect::<HashSet<_>>();
        let actual = names.iter().map(AsRef::as_ref).collect::<HashSet<_>>();
        wanted == actual
    }
}

/// Renders the subject as an RFC 4514 distinguished name, most significant RDN last.
impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rdns = [
            ("CN", &self.common_name),
            ("O", &self.organization),
            ("L", &self.locality),
            ("ST", &self.province),
            ("C", &self.country),
        ];

        let mut first = true;
        for (attr, value) in rdns.into_iter().filter(|(_, value)| !value.is_empty()) {
            if !first {
                f.write_str(",")?;
            }
            first = false;

            write!(f, "{attr}=")?;
            write_escaped(f, value)?;
        }

        Ok(())
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let last = value.chars().count().saturating_sub(1);

    for (idx, ch) in value.chars().enumerate() {
        let escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && matches!(ch, '#' | ' '))
            || (idx == last && ch == ' ');

        if escape {
            f.write_str("\\")?;
        }
        write!(f, "{ch}")?;
    }

    Ok(())
}
