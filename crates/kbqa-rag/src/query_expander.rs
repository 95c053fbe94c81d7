//! Domain-synonym query expansion

/// One row of the synonym table: any trigger found in a query pulls in the aliases
#[derive(Debug, Clone, PartialEq)]
pub struct SynonymRule {
    pub triggers: Vec<String>,
    pub aliases: Vec<String>,
}

impl SynonymRule {
    pub fn new(triggers: &[&str], aliases: &[&str]) -> Self {
        Self {
            triggers: triggers.iter().map(|t| t.to_lowercase()).collect(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn matches(&self, lowered_query: &str) -> bool {
        self.triggers.iter().any(|t| lowered_query.contains(t.as_str()))
    }
}

/// Secure-computation vocabulary, Chinese and English
pub fn default_rules() -> Vec<SynonymRule> {
    vec![
        SynonymRule::new(&["混淆电路"], &["Garbled Circuit", "姚氏混淆电路", "Yao"]),
        SynonymRule::new(&["garbled circuit"], &["混淆电路", "Yao's protocol"]),
        SynonymRule::new(&["秘密共享"], &["Secret Sharing", "Shamir secret sharing"]),
        SynonymRule::new(&["secret sharing"], &["秘密共享"]),
        SynonymRule::new(&["不经意传输"], &["Oblivious Transfer", "OT extension"]),
        SynonymRule::new(&["oblivious transfer"], &["不经意传输"]),
        SynonymRule::new(&["同态加密"], &["Homomorphic Encryption", "FHE"]),
        SynonymRule::new(&["homomorphic encryption"], &["同态加密"]),
        SynonymRule::new(&["安全多方计算", "多方安全计算"], &["Secure Multi-Party Computation", "MPC"]),
        SynonymRule::new(&["multi-party computation", "multiparty computation"], &["安全多方计算"]),
        SynonymRule::new(&["零知识证明"], &["Zero-Knowledge Proof", "ZKP"]),
        SynonymRule::new(&["zero-knowledge", "zero knowledge"], &["零知识证明"]),
    ]
}

/// Maps a query to itself plus alias queries from a fixed rule table
#[derive(Debug, Clone)]
pub struct QueryExpander {
    rules: Vec<SynonymRule>,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}

impl QueryExpander {
    pub fn with_rules(rules: Vec<SynonymRule>) -> Self {
        Self { rules }
    }

    /// Expander that never adds aliases
    pub fn disabled() -> Self {
        Self::with_rules(Vec::new())
    }

    /// Original query first, then each matching rule's aliases in table order
    pub fn expand(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut queries = vec![query.to_string()];
        let mut seen = vec![lowered.trim().to_string()];

        for rule in self.rules.iter().filter(|r| r.matches(&lowered)) {
            for alias in &rule.aliases {
                let key = alias.trim().to_lowercase();
                if key.is_empty() || seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                queries.push(alias.clone());
            }
        }
        queries
    }
}
