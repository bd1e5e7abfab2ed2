// grammar.rs --- named rules
//
// A grammar maps nonterminal names to compiled programs.  Rules may refer
// to rules that are defined later; names only resolve while the machine
// is running, so a missing rule is a parse-time authoring error.

use std::collections::HashMap;
use std::fmt;

use crate::code::{rule_ref, Action, Code};
use crate::vm::{Error, Parser};

pub struct Grammar<C = ()> {
    rules: HashMap<String, Code<C>>,
}

impl<C> Grammar<C> {
    pub fn new() -> Self {
        Grammar {
            rules: HashMap::new(),
        }
    }

    /// Normalize `program`, append the returning instruction carrying
    /// `action`, and store the result under `name`.  The returned program
    /// is a reference to the rule, so freshly defined rules compose as
    /// combinators right away.
    pub fn define(
        &mut self,
        name: &str,
        program: impl Into<Code<C>>,
        action: Option<Action<C>>,
    ) -> Code<C> {
        let code = program.into().with_ret(action);
        self.rules.insert(name.to_string(), code);
        rule_ref(name)
    }

    pub fn get(&self, name: &str) -> Result<&Code<C>, Error> {
        self.rules
            .get(name)
            .ok_or_else(|| Error::RuleNotFound(name.to_string()))
    }

    pub fn parser(&self, start: &str, context: C) -> Parser<'_, C> {
        Parser::new(self, start, context)
    }
}

impl<C> Default for Grammar<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Display for Grammar<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // sorted so dumps are stable
        let mut names: Vec<&String> = self.rules.keys().collect();
        names.sort();
        for name in names {
            writeln!(f, "{}:", name)?;
            write!(f, "{}", self.rules[name])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{action, literal, rule_ref, Instruction};
    use matcha_value::Value;

    #[test]
    fn define_returns_a_rule_reference() {
        let mut g: Grammar = Grammar::new();
        let r = g.define("a", literal("a"), None);
        assert_eq!(rule_ref::<()>("a"), r);
    }

    #[test]
    fn stored_rules_end_with_ret_carrying_the_callback() {
        let mut g: Grammar = Grammar::new();
        let f = action(|_cx: &mut (), values| Ok(Value::List(values)));
        g.define("a", literal("a"), Some(f.clone()));
        let code = g.get("a").unwrap();
        assert_eq!(
            Some(&Instruction::Ret(Some(f))),
            code.instructions().last()
        );
    }

    #[test]
    fn forward_references_are_fine_until_looked_up() {
        let mut g: Grammar = Grammar::new();
        g.define("a", rule_ref("later"), None);
        assert!(g.get("a").is_ok());
        assert_eq!(
            Err(Error::RuleNotFound("later".to_string())),
            g.get("later").map(|_| ())
        );
    }
}
