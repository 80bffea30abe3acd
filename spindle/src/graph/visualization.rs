//! Diagnostic rendering of a compiled graph as text or Graphviz DOT.

use std::fmt::Debug;

use super::compiled::CompiledStateGraph;
use super::state_graph::{NextEntry, END, START};

/// One line per transition, conditional edges marked with `?`.
pub fn generate_text<S>(graph: &CompiledStateGraph<S>) -> String
where
    S: Clone + Send + Sync + Debug + 'static,
{
    let mut lines = vec![format!("{} -> {}", START, graph.first_node_id())];
    let mut froms: Vec<&String> = graph.next_map().keys().collect();
    froms.sort();
    for from in froms {
        match &graph.next_map()[from] {
            NextEntry::Unconditional(to) => lines.push(format!("{} -> {}", from, to)),
            NextEntry::Conditional(router) => match &router.path_map {
                Some(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    for key in keys {
                        lines.push(format!("{} -? {} -> {}", from, key, map[key]));
                    }
                }
                None => lines.push(format!("{} -? <state>", from)),
            },
        }
    }
    lines.join("\n")
}

/// Graphviz DOT rendering; conditional edges are dashed.
pub fn generate_dot<S>(graph: &CompiledStateGraph<S>) -> String
where
    S: Clone + Send + Sync + Debug + 'static,
{
    let mut out = String::from("digraph {\n");
    let mut names: Vec<&String> = graph.nodes().keys().collect();
    names.sort();
    for name in names {
        out.push_str(&format!("    \"{}\";\n", name));
    }
    out.push_str(&format!("    \"{}\" -> \"{}\";\n", START, graph.first_node_id()));
    let mut froms: Vec<&String> = graph.next_map().keys().collect();
    froms.sort();
    for from in froms {
        match &graph.next_map()[from] {
            NextEntry::Unconditional(to) => {
                out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
            }
            NextEntry::Conditional(router) => {
                if let Some(map) = &router.path_map {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    for key in keys {
                        out.push_str(&format!(
                            "    \"{}\" -> \"{}\" [style=dashed, label=\"{}\"];\n",
                            from, map[key], key
                        ));
                    }
                } else {
                    out.push_str(&format!(
                        "    \"{}\" -> \"{}\" [style=dashed];\n",
                        from, END
                    ));
                }
            }
        }
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::AgentError;
    use crate::graph::{Next, Node, StateGraph};

    #[derive(Clone, Debug)]
    struct S;

    struct N(&'static str);

    #[async_trait]
    impl Node<S> for N {
        fn id(&self) -> &str {
            self.0
        }
        async fn run(&self, state: S) -> Result<(S, Next), AgentError> {
            Ok((state, Next::Continue))
        }
    }

    #[test]
    fn text_and_dot_list_every_transition() {
        let mut graph = StateGraph::new();
        graph.add_node("a", Arc::new(N("a")));
        graph.add_node("b", Arc::new(N("b")));
        graph.add_edge(START, "a");
        graph.add_edge("b", END);
        graph.add_conditional_edges(
            "a",
            Arc::new(|_: &S| "b".to_string()),
            Some(
                [
                    ("go".to_string(), "b".to_string()),
                    ("stop".to_string(), END.to_string()),
                ]
                .into_iter()
                .collect(),
            ),
        );
        let compiled = graph.compile().unwrap();

        let text = generate_text(&compiled);
        assert!(text.contains("__start__ -> a"));
        assert!(text.contains("a -? go -> b"));
        assert!(text.contains("a -? stop -> __end__"));

        let dot = generate_dot(&compiled);
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("style=dashed"));
    }
}
