use regex::RegexSet;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid pattern {pattern:?}: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// File name filter. A name is eligible when at least one pattern matches
/// the whole name; an empty set matches nothing.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    sources: Vec<String>,
    set: RegexSet,
}

impl PatternMatcher {
    pub fn compile<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sources: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();
        let mut anchored = Vec::with_capacity(sources.len());
        for pattern in &sources {
            let full = format!("^(?:{pattern})$");
            // Compile one by one so the error names the offending pattern.
            regex::Regex::new(&full).map_err(|source| PatternError {
                pattern: pattern.clone(),
                source,
            })?;
            anchored.push(full);
        }
        let set = RegexSet::new(&anchored).map_err(|source| PatternError {
            pattern: sources.join(","),
            source,
        })?;
        Ok(Self { sources, set })
    }

    pub fn is_match(&self, file_name: &str) -> bool {
        self.set.is_match(file_name)
    }

    pub fn patterns(&self) -> &[String] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
