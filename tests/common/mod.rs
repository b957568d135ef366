//! Shared fixtures: users with comments and profiles in an in-memory database
#![allow(dead_code)]

use restmodel::prelude::*;

/// Build a row from name/value pairs
pub fn row(pairs: &[(&str, FieldValue)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub struct Fixture {
    pub db: InMemoryDatabase,
    pub users: Arc<dyn Store>,
    pub comments: Arc<dyn Store>,
    pub profiles: Arc<dyn Store>,
}

impl Fixture {
    pub fn count(&self, entity_type: &str) -> usize {
        self.db.rows(entity_type).unwrap().len()
    }

    pub fn value(&self, entity_type: &str, id: i64, attribute: &str) -> FieldValue {
        self.db
            .rows(entity_type)
            .unwrap()
            .into_iter()
            .find(|r| r["id"] == FieldValue::Integer(id))
            .map(|r| r[attribute].clone())
            .unwrap_or_default()
    }
}

/// Three users (two in tenant 1), three comments, one profile
pub fn fixture() -> Fixture {
    let db = InMemoryDatabase::new();

    let users = db
        .define(
            EntitySchema::new("user", ["id", "name", "email", "status", "tenant_id"])
                .relation("comments", RelationDef::has_many("comment", "user_id").restrict())
                .relation("profile", RelationDef::has_one("profile", "user_id"))
                .rule(Rule::new(["name", "email"], validators::required()))
                .rule(Rule::new(["name"], validators::string_length(2, 50)))
                .rule(Rule::new(["email"], validators::email()))
                .rule(Rule::new(
                    ["status"],
                    validators::in_list(vec!["active".into(), "inactive".into()]),
                ))
                .unique("email"),
        )
        .unwrap();
    let comments = db
        .define(
            EntitySchema::new("comment", ["id", "user_id", "text"])
                .relation("author", RelationDef::belongs_to("user", "user_id"))
                .rule(Rule::new(["text"], validators::required())),
        )
        .unwrap();
    let profiles = db
        .define(
            EntitySchema::new("profile", ["id", "user_id", "bio"])
                .relation("owner", RelationDef::belongs_to("user", "user_id")),
        )
        .unwrap();

    for (name, email, status, tenant) in [
        ("Alice", "alice@example.com", "active", 1),
        ("Bob", "bob@example.com", "inactive", 1),
        ("Carol", "carol@example.org", "active", 2),
    ] {
        db.insert(
            "user",
            row(&[
                ("name", name.into()),
                ("email", email.into()),
                ("status", status.into()),
                ("tenant_id", tenant.into()),
            ]),
        )
        .unwrap();
    }
    for (user_id, text) in [(1, "First"), (1, "Second"), (3, "Hi")] {
        db.insert("comment", row(&[("user_id", user_id.into()), ("text", text.into())]))
            .unwrap();
    }
    db.insert("profile", row(&[("user_id", 1.into()), ("bio", "Likes Rust".into())]))
        .unwrap();

    Fixture {
        db,
        users: Arc::new(users),
        comments: Arc::new(comments),
        profiles: Arc::new(profiles),
    }
}

/// Relations a client may request on users
pub fn user_relations() -> RelationConfig {
    let mut relations = RelationConfig::new();
    relations.insert(
        "comments".into(),
        RelationSpec::new()
            .returning(ReturnMode::Array)
            .keyed_by("id")
            .safe_attributes(["id", "text"]),
    );
    relations.insert("profile".into(), RelationSpec::new());
    relations.insert(
        "writings".into(),
        RelationSpec::new().relation("comments").column("posts"),
    );
    relations
}

pub fn users_controller(fx: &Fixture) -> ApiController {
    ApiController::new("users", fx.users.clone()).with_relations(user_relations())
}

pub fn comments_controller(fx: &Fixture) -> ApiController {
    ApiController::new("comments", fx.comments.clone())
        .with_relation("author", RelationSpec::new().safe_attributes(["id", "name"]))
}

/// Request helpers
pub fn get(query: &str) -> RequestContext {
    RequestContext::new(Verb::Get).with_query(query)
}

pub fn view(id: &str, query: &str) -> RequestContext {
    RequestContext::new(Verb::Get).with_id(id).with_query(query)
}

pub fn post(body: Value) -> RequestContext {
    RequestContext::new(Verb::Post).with_body(body)
}

pub fn put(id: Option<&str>, query: &str, body: Value) -> RequestContext {
    let ctx = RequestContext::new(Verb::Put).with_query(query).with_body(body);
    match id {
        Some(id) => ctx.with_id(id),
        None => ctx,
    }
}

pub fn delete(id: Option<&str>, query: &str) -> RequestContext {
    let ctx = RequestContext::new(Verb::Delete).with_query(query);
    match id {
        Some(id) => ctx.with_id(id),
        None => ctx,
    }
}

/// Values of one attribute across a list payload
pub fn column(payload: &Value, attribute: &str) -> Vec<Value> {
    payload
        .as_array()
        .map(|rows| rows.iter().map(|r| r[attribute].clone()).collect())
        .unwrap_or_default()
}
