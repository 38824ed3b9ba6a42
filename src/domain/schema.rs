// Persisted relationship fields per node kind.
// Only edges named here leave the process; everything else stays in memory.

use crate::domain::program::{NodeKind, Relation};

pub fn relationship_fields(kind: NodeKind) -> &'static [Relation] {
    use NodeKind::*;
    use Relation::*;
    match kind {
        TranslationUnitDeclaration => &[Declarations, Language, Scope],
        FunctionDeclaration => &[Parameters, Body, Eog, Dfg, Scope, Type, Language],
        ParameterDeclaration => &[Dfg, Type, Scope],
        VariableDeclaration => &[Initializer, Dfg, Type, Scope],
        Block => &[Statements, Eog, Dfg, Scope],
        CallExpression => &[Arguments, Invokes, Eog, Dfg, Type],
        Reference => &[RefersTo, Eog, Dfg, Type],
        Literal => &[Eog, Dfg, Type],
        UnaryOperator | AssignExpression => &[Input, Eog, Dfg, Type],
        NewArrayExpression => &[Initializer, Dfg, Type],
        InitializerListExpression => &[Arguments, Dfg, Type],
        NodeKind::Expression => &[Eog, Dfg, Type],
        FunctionScope | LocalScope | LlvmIrLanguage | ObjectType | UnknownType => &[],
    }
}

pub fn declares(kind: NodeKind, relation: Relation) -> bool {
    relationship_fields(kind).contains(&relation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_persist_arguments_and_invokes() {
        assert!(declares(NodeKind::CallExpression, Relation::Arguments));
        assert!(declares(NodeKind::CallExpression, Relation::Invokes));
        assert!(!declares(NodeKind::CallExpression, Relation::RefersTo));
    }

    #[test]
    fn test_scopes_and_types_are_leaves() {
        assert!(relationship_fields(NodeKind::FunctionScope).is_empty());
        assert!(relationship_fields(NodeKind::UnknownType).is_empty());
    }
}
