use super::query::{
    Collation, Comparison, JoinSpec, OrderBy, OrderByDir, Pager, Predicate, Relation, Value,
};
use super::result::LdbError;
use super::schema::{Attribute, DataType, Model, Registry, RelType};
use super::search::SearchCompiler;
use super::search::SearchParseError;
use super::search::MAX_EXPR_DEPTH;
use super::sql::{is_identifier, SqlRenderer};
use chrono::NaiveDate;
use json;
use json::JsonValue;
use std::sync::Arc;

const CONJUNCTION_QUERY: &str = r#"{
    "filter": ["and", [
        ["Form", "transcription", "like", "abc"],
        ["Form", "elicitor", "id", "=", 13]
    ]]
}"#;

const MULTI_ERROR_QUERY: &str = r#"{
    "filter": ["not", ["and", [
        ["Frog", "legs", "like", "%"],
        ["Form", "thumbs", "=", 1],
        ["Form", "tags", "like", "%x%"]
    ]]]
}"#;

const BAD_DATE_SIBLING_QUERY: &str = r#"{
    "filter": ["and", [
        ["Form", "dateElicited", "=", "2012-13-40"],
        ["Form", "transcription", "like", "%a%"]
    ]]
}"#;

fn form_compiler() -> SearchCompiler {
    SearchCompiler::new(Arc::new(Registry::fieldwork()), "Form", false).unwrap()
}

fn query_for(filter: &str) -> JsonValue {
    json::object! { filter: json::parse(filter).unwrap() }
}

fn rejected(compiler: &SearchCompiler, query: &JsonValue) -> SearchParseError {
    match compiler.compile(query) {
        Ok(_) => panic!("Compile unexpectedly succeeded: {}", query.dump()),
        Err(e) => e.search_or_default(),
    }
}

#[test]
fn compile_simple_comparison() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "transcription", "like", "%a%"]"#);
    let search = compiler.compile(&query).unwrap();

    let want = Comparison::new(
        "Form",
        "transcription",
        None,
        Relation::Like,
        Value::Str("%a%".to_string()),
        Some(Collation::Binary),
    );

    if let Predicate::Compare(cmp) = search.predicate() {
        assert_eq!(cmp.as_ref(), &want);
    } else {
        panic!("Expected a comparison predicate");
    }

    assert!(search.joins().is_empty());
    assert_eq!(
        search.order_by(),
        &OrderBy::new("Form", "id", None, OrderByDir::Asc, None)
    );
}

#[test]
fn negation_wraps_inner_test() {
    let compiler = form_compiler();
    let query = query_for(r#"["not", ["Form", "transcription", "like", "%a%"]]"#);
    let search = compiler.compile(&query).unwrap();

    if let Predicate::Not(inner) = search.predicate() {
        if let Predicate::Compare(cmp) = inner.as_ref() {
            assert_eq!(cmp.relation(), Relation::Like);
        } else {
            panic!("Expected a comparison inside the negation");
        }
    } else {
        panic!("Expected a negation predicate");
    }
}

#[test]
fn extra_negation_operands_are_dropped() {
    let compiler = form_compiler();
    let query = query_for(
        r#"["not",
            ["Form", "transcription", "like", "%a%"],
            ["Form", "transcription", "like", "%b%"]]"#,
    );
    let search = compiler.compile(&query).unwrap();

    if let Predicate::Not(inner) = search.predicate() {
        if let Predicate::Compare(cmp) = inner.as_ref() {
            assert_eq!(cmp.value(), &Value::Str("%a%".to_string()));
        } else {
            panic!("Expected a comparison inside the negation");
        }
    } else {
        panic!("Expected a negation predicate");
    }
}

#[test]
fn conjunction_with_related_test_adds_no_joins() {
    let compiler = form_compiler();
    let query = json::parse(CONJUNCTION_QUERY).unwrap();
    let search = compiler.compile(&query).unwrap();

    // A related-record test on the search target runs as a subquery,
    // so nothing is joined.
    assert!(search.joins().is_empty());

    let members = match search.predicate() {
        Predicate::And(members) => members,
        _ => panic!("Expected a conjunction"),
    };
    assert_eq!(members.len(), 2);

    if let Predicate::Related(related) = &members[1] {
        assert_eq!(related.model(), "Form");
        assert_eq!(related.attribute(), "elicitor");
        assert_eq!(related.reltype(), RelType::Scalar);
        assert_eq!(related.test().model(), "User");
        assert_eq!(related.test().attribute(), "id");
        assert_eq!(related.test().value(), &Value::Int(13));
    } else {
        panic!("Expected a related test as the second member");
    }
}

#[test]
fn disjunction_compiles_members() {
    let compiler = form_compiler();
    let query = query_for(
        r#"["or", [
            ["Form", "transcription", "like", "%a%"],
            ["Form", "morphemeBreak", "like", "%b%"]]]"#,
    );
    let search = compiler.compile(&query).unwrap();

    match search.predicate() {
        Predicate::Or(members) => assert_eq!(members.len(), 2),
        _ => panic!("Expected a disjunction"),
    }
}

#[test]
fn cross_model_comparison_is_aliased() {
    let compiler = form_compiler();
    let query = query_for(r#"["Gloss", "gloss", "like", "1"]"#);
    let search = compiler.compile(&query).unwrap();

    assert_eq!(
        search.joins(),
        &[JoinSpec::new("Gloss", "gloss_1", "glosses")]
    );

    if let Predicate::Compare(cmp) = search.predicate() {
        assert_eq!(cmp.model(), "Gloss");
        assert_eq!(cmp.alias(), Some("gloss_1"));
    } else {
        panic!("Expected a comparison predicate");
    }
}

#[test]
fn repeated_model_joins_once() {
    let compiler = form_compiler();
    let query = query_for(
        r#"["and", [
            ["Tag", "name", "like", "%a%"],
            ["Tag", "name", "like", "%b%"]]]"#,
    );
    let search = compiler.compile(&query).unwrap();

    assert_eq!(search.joins(), &[JoinSpec::new("Tag", "tag_1", "tags")]);
}

#[test]
fn join_aliases_number_in_order() {
    let compiler = form_compiler();
    let query = query_for(
        r#"["and", [
            ["Tag", "name", "like", "%a%"],
            ["Gloss", "gloss", "like", "%b%"]]]"#,
    );
    let search = compiler.compile(&query).unwrap();

    assert_eq!(
        search.joins(),
        &[
            JoinSpec::new("Tag", "tag_1", "tags"),
            JoinSpec::new("Gloss", "gloss_2", "glosses"),
        ]
    );
}

#[test]
fn memorizer_searches_join_the_user_table() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let query = query_for(r#"["Memorizer", "firstName", "like", "%b%"]"#);
    let search = compiler.compile(&query).unwrap();

    // The Memorizer pseudo-model stores its rows in the user table.
    assert_eq!(
        search.joins(),
        &[JoinSpec::new("User", "user_1", "memorizers")]
    );

    if let Predicate::Compare(cmp) = search.predicate() {
        assert_eq!(cmp.model(), "Memorizer");
        assert_eq!(cmp.alias(), Some("user_1"));
    } else {
        panic!("Expected a comparison predicate");
    }

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT DISTINCT form.* FROM form",
            " LEFT JOIN userform ON (userform.form_id = form.id)",
            " LEFT JOIN user AS user_1 ON (user_1.id = userform.user_id)",
            " WHERE user_1.firstName COLLATE BINARY LIKE $1",
            " ORDER BY form.id ASC",
        )
    );
}

#[test]
fn unjoinable_model_is_reported() {
    let compiler = SearchCompiler::new(Arc::new(Registry::fieldwork()), "File", false).unwrap();
    let query = query_for(r#"["Gloss", "gloss", "like", "%"]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Gloss").unwrap(),
        "Searching the File model by joining on the Gloss model is not possible"
    );
}

#[test]
fn collection_attribute_rejects_value_relations() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "tags", "like", "%x%"]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Form.tags.like").unwrap(),
        "The relation like is not permitted for Form.tags"
    );
}

#[test]
fn scalar_link_compares_only_to_null() {
    let compiler = form_compiler();

    let query = query_for(r#"["Form", "enterer", "=", 13]"#);
    let errors = rejected(&compiler, &query);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Form.enterer.eq").unwrap(),
        "Invalid filter expression: Form.enterer.eq(13)"
    );

    let query = query_for(r#"["Form", "enterer", "=", null]"#);
    let search = compiler.compile(&query).unwrap();
    if let Predicate::Compare(cmp) = search.predicate() {
        assert_eq!(cmp.value(), &Value::Null);
        assert_eq!(cmp.collation(), None);
    } else {
        panic!("Expected a comparison predicate");
    }
}

#[test]
fn collection_link_emptiness_tests() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let renderer = SqlRenderer::new(registry);

    let query = query_for(r#"["Form", "tags", "=", null]"#);
    let search = compiler.compile(&query).unwrap();
    let sql = renderer.render(&search, "Form", None).unwrap();
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT form.* FROM form",
            " WHERE NOT EXISTS (SELECT 1 FROM formtag WHERE formtag.form_id = form.id)",
            " ORDER BY form.id ASC",
        )
    );
    assert!(sql.params().is_empty());

    let query = query_for(r#"["Form", "tags", "!=", null]"#);
    let search = compiler.compile(&query).unwrap();
    let sql = renderer.render(&search, "Form", None).unwrap();
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT form.* FROM form",
            " WHERE EXISTS (SELECT 1 FROM formtag WHERE formtag.form_id = form.id)",
            " ORDER BY form.id ASC",
        )
    );
}

#[test]
fn related_test_requires_link() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "transcription", "id", "=", 1]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Form.transcription").unwrap(),
        "The transcription attribute of the Form model does not represent a many-to-one relation."
    );
}

#[test]
fn foreign_attribute_errors_use_foreign_coordinates() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "memorizers", "username", "like", "%e%"]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("User.username").unwrap(),
        "Searching on User.username is not permitted"
    );
}

#[test]
fn related_collection_test_compiles() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let query = query_for(r#"["Form", "tags", "name", "like", "%x%"]"#);
    let search = compiler.compile(&query).unwrap();

    assert!(search.joins().is_empty());

    if let Predicate::Related(related) = search.predicate() {
        assert_eq!(related.reltype(), RelType::Collection);
        assert_eq!(related.test().model(), "Tag");
        assert_eq!(related.test().attribute(), "name");
        assert_eq!(related.test().collation(), Some(Collation::Binary));
    } else {
        panic!("Expected a related test");
    }

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT form.* FROM form",
            " WHERE EXISTS (SELECT 1 FROM formtag",
            " JOIN tag AS tag_r ON (tag_r.id = formtag.tag_id)",
            " WHERE formtag.form_id = form.id AND tag_r.name COLLATE BINARY LIKE $1)",
            " ORDER BY form.id ASC",
        )
    );
    assert_eq!(sql.params(), &[Value::Str("%x%".to_string())]);
}

#[test]
fn unknown_model_is_a_single_error() {
    let compiler = form_compiler();
    let query = query_for(r#"["Frog", "legs", "like", "%"]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Frog").unwrap(),
        "Searching on the Frog model is not permitted"
    );
}

#[test]
fn unknown_attribute_is_a_single_error() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "thumbs", "=", 1]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Form.thumbs").unwrap(),
        "Searching on Form.thumbs is not permitted"
    );
}

#[test]
fn errors_accumulate_across_branches() {
    let compiler = form_compiler();
    let query = json::parse(MULTI_ERROR_QUERY).unwrap();
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 3);
    assert!(errors.get("Frog").is_some());
    assert!(errors.get("Form.thumbs").is_some());
    assert!(errors.get("Form.tags.like").is_some());
}

#[test]
fn invalid_date_leaves_siblings_intact() {
    let compiler = form_compiler();
    let query = json::parse(BAD_DATE_SIBLING_QUERY).unwrap();
    let errors = rejected(&compiler, &query);

    // The sibling leaf compiled cleanly; only the date is reported.
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("date 2012-13-40").unwrap(),
        "Date search parameters must be valid ISO 8601 date strings."
    );
}

#[test]
fn date_values_coerce() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "dateElicited", "=", "2012-01-31"]"#);
    let search = compiler.compile(&query).unwrap();

    if let Predicate::Compare(cmp) = search.predicate() {
        let want = NaiveDate::from_ymd_opt(2012, 1, 31).unwrap();
        assert_eq!(cmp.value(), &Value::Date(want));
        assert_eq!(cmp.collation(), None);
    } else {
        panic!("Expected a comparison predicate");
    }
}

#[test]
fn datetime_values_coerce() {
    let compiler = form_compiler();

    let query = query_for(r#"["Form", "datetimeEntered", "<", "2012-01-01T12:30:00"]"#);
    let search = compiler.compile(&query).unwrap();
    if let Predicate::Compare(cmp) = search.predicate() {
        let want = NaiveDate::from_ymd_opt(2012, 1, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(cmp.value(), &Value::Datetime(want));
    } else {
        panic!("Expected a comparison predicate");
    }

    let query = query_for(r#"["Form", "datetimeEntered", "=", "2012-01-01T25:00:00"]"#);
    let errors = rejected(&compiler, &query);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("datetime 2012-01-01T25:00:00").unwrap(),
        "Datetime search parameters must be valid ISO 8601 datetime strings."
    );
}

#[test]
fn date_list_members_coerce() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "dateElicited", "in", ["2012-01-01", "2012-13-40"]]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert!(errors.get("date 2012-13-40").is_some());
}

#[test]
fn in_relation_requires_a_list() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "id", "in", null]"#);
    let errors = rejected(&compiler, &query);

    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Form.id.in").unwrap(),
        "Invalid filter expression: Form.id.in(null)"
    );
}

#[test]
fn empty_in_list_matches_nothing() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let query = query_for(r#"["Form", "id", "in", []]"#);
    let search = compiler.compile(&query).unwrap();

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        "SELECT form.* FROM form WHERE form.id IN (NULL) ORDER BY form.id ASC"
    );
    assert!(sql.params().is_empty());
}

#[test]
fn search_values_normalize_to_nfd() {
    let compiler = form_compiler();
    let query = query_for(r#"["Form", "transcription", "=", "café"]"#);
    let search = compiler.compile(&query).unwrap();

    if let Predicate::Compare(cmp) = search.predicate() {
        assert_eq!(cmp.value(), &Value::Str("cafe\u{301}".to_string()));
    } else {
        panic!("Expected a comparison predicate");
    }
}

#[test]
fn uppercase_keywords_are_not_keywords() {
    let compiler = form_compiler();
    let query = query_for(r#"["NOT", ["Form", "transcription", "like", "%a%"]]"#);
    let errors = rejected(&compiler, &query);

    // "NOT" reads as a leaf model name, so the leaf arity check fires.
    assert_eq!(errors.len(), 2);
    assert_eq!(
        errors.get("Malformed query error").unwrap(),
        "The submitted query was malformed"
    );
    assert!(errors.get("ArityError").is_some());
}

#[test]
fn missing_operand_is_an_index_error() {
    let compiler = form_compiler();

    for filter in ["[\"not\"]", "[\"and\"]", "[\"or\"]"] {
        let errors = rejected(&compiler, &query_for(filter));
        assert_eq!(errors.len(), 2, "filter: {filter}");
        assert!(errors.get("Malformed query error").is_some());
        assert!(errors.get("IndexError").is_some(), "filter: {filter}");
    }
}

#[test]
fn wrong_shapes_are_type_errors() {
    let compiler = form_compiler();

    // A bare string where an expression list belongs.
    let errors = rejected(&compiler, &query_for(r#""abc""#));
    assert!(errors.get("TypeError").is_some());

    // A boolean whose operand list is not a list.
    let errors = rejected(&compiler, &query_for(r#"["and", "nope"]"#));
    assert!(errors.get("TypeError").is_some());

    // A leaf name position holding a number.
    let errors = rejected(&compiler, &query_for(r#"["Form", 7, "like", "%a%"]"#));
    assert!(errors.get("TypeError").is_some());

    // An object in search-value position.
    let errors = rejected(&compiler, &query_for(r#"["Form", "transcription", "=", {"a": 1}]"#));
    assert!(errors.get("TypeError").is_some());
}

#[test]
fn leaf_arity_is_checked() {
    let compiler = form_compiler();

    let errors = rejected(&compiler, &query_for("[]"));
    assert!(errors.get("ArityError").is_some());

    let errors = rejected(
        &compiler,
        &query_for(r#"["Form", "transcription", "like", "%a%", "x", "y"]"#),
    );
    assert!(errors.get("ArityError").is_some());
}

#[test]
fn nesting_depth_is_limited() {
    let compiler = form_compiler();

    let mut filter = json::array!["Form", "transcription", "like", "%a%"];
    for _ in 0..(MAX_EXPR_DEPTH + 2) {
        filter = json::array!["not", filter];
    }
    let query = json::object! { filter: filter };

    let errors = rejected(&compiler, &query);
    assert!(errors.get("DepthError").is_some());
}

#[test]
fn empty_boolean_matches_everything() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();

    let search = compiler.compile(&query_for(r#"["and", []]"#)).unwrap();
    assert_eq!(search.predicate(), &Predicate::Always);

    let search = compiler.compile(&query_for(r#"["or", []]"#)).unwrap();
    assert_eq!(search.predicate(), &Predicate::Always);

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        "SELECT form.* FROM form WHERE TRUE ORDER BY form.id ASC"
    );
}

#[test]
fn absent_filter_matches_everything() {
    let compiler = form_compiler();
    let search = compiler.compile(&json::object! {}).unwrap();

    assert_eq!(search.predicate(), &Predicate::Always);
    assert!(search.joins().is_empty());
    assert_eq!(
        search.order_by(),
        &OrderBy::new("Form", "id", None, OrderByDir::Asc, None)
    );
}

#[test]
fn non_object_queries_are_rejected() {
    let compiler = form_compiler();

    for query in [JsonValue::Null, json::array![1, 2], "abc".into()] {
        match compiler.compile(&query) {
            Err(LdbError::Debug(msg)) => assert_eq!(
                msg.as_str(),
                "The specified search parameters generated an invalid database query"
            ),
            Err(_) => panic!("Expected a debug error"),
            Ok(_) => panic!("Compile unexpectedly succeeded"),
        }
    }
}

#[test]
fn order_by_directions() {
    let compiler = form_compiler();

    let query = json::object! { order_by: json::array!["Form", "transcription", "desc"] };
    let search = compiler.compile(&query).unwrap();
    assert_eq!(search.order_by().dir(), OrderByDir::Desc);

    // Anything but the exact word "desc" sorts ascending, without
    // complaint.
    let query = json::object! { order_by: json::array!["Form", "transcription", "descending"] };
    let search = compiler.compile(&query).unwrap();
    assert_eq!(search.order_by().dir(), OrderByDir::Asc);

    let query = json::object! { order_by: json::array!["Form", "transcription"] };
    let search = compiler.compile(&query).unwrap();
    assert_eq!(search.order_by().dir(), OrderByDir::Asc);
    assert_eq!(search.order_by().attribute(), "transcription");
}

#[test]
fn order_by_failures_degrade() {
    let compiler = form_compiler();

    let query = json::object! { order_by: json::array!["Form"] };
    let errors = rejected(&compiler, &query);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("OrderByError").unwrap(),
        "The provided order by expression was invalid."
    );

    let query = json::object! { order_by: json::array!["Form", "thumbs"] };
    let errors = rejected(&compiler, &query);
    assert_eq!(errors.len(), 2);
    assert!(errors.get("Form.thumbs").is_some());
    assert!(errors.get("OrderByError").is_some());

    // Linked attributes have no ordering column.
    let query = json::object! { order_by: json::array!["Form", "enterer"] };
    let errors = rejected(&compiler, &query);
    assert_eq!(errors.len(), 1);
    assert!(errors.get("OrderByError").is_some());
}

#[test]
fn order_by_can_join() {
    let compiler = form_compiler();
    let query = json::object! { order_by: json::array!["Tag", "name"] };
    let search = compiler.compile(&query).unwrap();

    assert_eq!(search.joins(), &[JoinSpec::new("Tag", "tag_1", "tags")]);
    assert_eq!(search.order_by().model(), "Tag");
    assert_eq!(search.order_by().alias(), Some("tag_1"));
}

#[test]
fn order_by_reuses_filter_joins() {
    let compiler = form_compiler();
    let query = json::object! {
        filter: json::parse(r#"["Tag", "name", "like", "%a%"]"#).unwrap(),
        order_by: json::array!["Tag", "name"],
    };
    let search = compiler.compile(&query).unwrap();

    assert_eq!(search.joins().len(), 1);
    assert_eq!(search.order_by().alias(), Some("tag_1"));
}

#[test]
fn ordering_collates_nocase_for_byte_wise_stores() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", true).unwrap();
    let query = json::object! {
        filter: json::parse(r#"["Form", "transcription", "=", "abc"]"#).unwrap(),
        order_by: json::array!["Form", "transcription", "desc"],
    };
    let search = compiler.compile(&query).unwrap();

    // Comparisons run against the store's own collation; only the
    // ordering is forced case-insensitive.
    if let Predicate::Compare(cmp) = search.predicate() {
        assert_eq!(cmp.collation(), None);
    } else {
        panic!("Expected a comparison predicate");
    }
    assert_eq!(
        search.order_by().collation(),
        Some(Collation::CaseInsensitive)
    );

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT form.* FROM form WHERE form.transcription = $1",
            " ORDER BY form.transcription COLLATE NOCASE DESC",
        )
    );
}

#[test]
fn compile_state_resets_between_calls() {
    let compiler = form_compiler();
    let query = query_for(r#"["Tag", "name", "like", "%a%"]"#);

    let first = compiler.compile(&query).unwrap();
    let second = compiler.compile(&query).unwrap();
    assert_eq!(first, second);

    // A failing compile in between leaks nothing into the next one.
    let bad = query_for(r#"["Frog", "legs", "like", "%"]"#);
    let errors = rejected(&compiler, &bad);
    assert_eq!(errors.len(), 1);

    let third = compiler.compile(&query).unwrap();
    assert_eq!(first, third);
    assert_eq!(third.joins(), &[JoinSpec::new("Tag", "tag_1", "tags")]);
}

#[test]
fn search_parameters_list_coordinates() {
    let compiler = form_compiler();
    let params = compiler.search_parameters();

    assert_eq!(params["attributes"]["transcription"]["type"], "text");
    assert_eq!(params["attributes"]["tags"]["foreign_model"], "Tag");
    assert_eq!(params["attributes"]["tags"]["foreign_type"], "collection");
    assert_eq!(params["relations"].len(), 9);
    assert!(params["relations"].members().any(|r| *r == "regexp"));
}

#[test]
fn custom_registries_compile() {
    let mut note = Model::new("Note", "note", "id");
    note.add(Attribute::new("id", DataType::Id));
    note.add(Attribute::new("title", DataType::Text).restricted(&[Relation::Eq, Relation::Ne]));
    note.add(Attribute::new("header", DataType::Text).aliased("title"));

    let mut registry = Registry::new();
    registry.insert(note);

    let compiler = SearchCompiler::new(Arc::new(registry), "Note", true).unwrap();

    // The aliased attribute resolves to its canonical column.
    let search = compiler
        .compile(&query_for(r#"["Note", "header", "=", "x"]"#))
        .unwrap();
    if let Predicate::Compare(cmp) = search.predicate() {
        assert_eq!(cmp.attribute(), "title");
    } else {
        panic!("Expected a comparison predicate");
    }

    let errors = rejected(&compiler, &query_for(r#"["Note", "title", "like", "%"]"#));
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.get("Note.title.like").unwrap(),
        "The relation like is not permitted for Note.title"
    );
}

#[test]
fn renderer_rejects_unsafe_identifiers() {
    assert!(is_identifier("tag_1"));
    assert!(is_identifier(" form "));
    assert!(!is_identifier(""));
    assert!(!is_identifier("a b"));
    assert!(!is_identifier("a;b"));
    assert!(!is_identifier("café"));

    let mut evil = Model::new("Evil", "bad table", "id");
    evil.add(Attribute::new("id", DataType::Id));
    let mut registry = Registry::new();
    registry.insert(evil);
    let registry = Arc::new(registry);

    let compiler = SearchCompiler::new(registry.clone(), "Evil", false).unwrap();
    let search = compiler
        .compile(&query_for(r#"["Evil", "id", "=", 1]"#))
        .unwrap();

    assert!(SqlRenderer::new(registry).render(&search, "Evil", None).is_err());
}

#[test]
fn render_simple_select() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let search = compiler
        .compile(&query_for(r#"["Form", "transcription", "like", "%a%"]"#))
        .unwrap();

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT form.* FROM form WHERE form.transcription COLLATE BINARY LIKE $1",
            " ORDER BY form.id ASC",
        )
    );
    assert_eq!(sql.params(), &[Value::Str("%a%".to_string())]);
}

#[test]
fn render_junction_join() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let search = compiler
        .compile(&query_for(r#"["Tag", "name", "like", "%x%"]"#))
        .unwrap();

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();

    // Collection joins multiply rows, so the select is DISTINCT.
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT DISTINCT form.* FROM form",
            " LEFT JOIN formtag ON (formtag.form_id = form.id)",
            " LEFT JOIN tag AS tag_1 ON (tag_1.id = formtag.tag_id)",
            " WHERE tag_1.name COLLATE BINARY LIKE $1",
            " ORDER BY form.id ASC",
        )
    );
}

#[test]
fn render_related_scalar_test() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let search = compiler
        .compile(&query_for(r#"["Form", "elicitor", "id", "=", 13]"#))
        .unwrap();

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        concat!(
            "SELECT form.* FROM form",
            " WHERE EXISTS (SELECT 1 FROM user AS user_r",
            " WHERE user_r.id = form.elicitor_id AND user_r.id = $1)",
            " ORDER BY form.id ASC",
        )
    );
    assert_eq!(sql.params(), &[Value::Int(13)]);
}

#[test]
fn render_in_list() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let search = compiler
        .compile(&query_for(r#"["Form", "id", "in", [1, 2, 3]]"#))
        .unwrap();

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        "SELECT form.* FROM form WHERE form.id IN ($1,$2,$3) ORDER BY form.id ASC"
    );
    assert_eq!(
        sql.params(),
        &[Value::Int(1), Value::Int(2), Value::Int(3)]
    );
}

#[test]
fn render_scalar_link_null() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let search = compiler
        .compile(&query_for(r#"["Form", "enterer", "!=", null]"#))
        .unwrap();

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", None)
        .unwrap();
    assert_eq!(
        sql.sql(),
        "SELECT form.* FROM form WHERE form.enterer_id IS NOT NULL ORDER BY form.id ASC"
    );
}

#[test]
fn render_pagination() {
    let registry = Arc::new(Registry::fieldwork());
    let compiler = SearchCompiler::new(registry.clone(), "Form", false).unwrap();
    let search = compiler
        .compile(&query_for(r#"["Form", "transcription", "like", "%a%"]"#))
        .unwrap();

    let pager = Pager::new(3, 20);
    assert_eq!(pager.limit(), 20);
    assert_eq!(pager.offset(), 40);

    let sql = SqlRenderer::new(registry)
        .render(&search, "Form", Some(&pager))
        .unwrap();
    assert!(sql.sql().ends_with(" LIMIT 20 OFFSET 40"));

    let pager = Pager::from_json(&json::object! { page: 2, items_per_page: 10 }).unwrap();
    assert_eq!(pager.offset(), 10);

    assert!(Pager::from_json(&json::object! { page: 0, items_per_page: 10 }).is_err());
    assert!(Pager::from_json(&json::object! { page: 1 }).is_err());
}
