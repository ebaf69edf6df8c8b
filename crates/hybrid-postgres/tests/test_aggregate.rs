//! Cached COUNT and SUM against a scripted session and the in-memory cache.

mod common;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use common::{context, items, items_table, row, ScriptedDb};
use hybrid_postgres::{
    CacheStore, CountOptions, HybridError, Lookup, MemoryCache, Model, ModelDef, Predicate, Session, SumOptions,
    Value,
};
use rust_decimal::Decimal;

fn popular() -> Lookup {
    Lookup::all().filter(Predicate::gt("views", 100))
}

fn shop_items(db: &ScriptedDb, cache: &MemoryCache) -> Model {
    let app = context(db, cache).with_name("shop");
    Model::bind(Arc::new(ModelDef::new("Item", items_table())), app)
}

#[tokio::test]
async fn test_count_is_cached_under_statement_digest() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);
    db.rows(vec![row(&[("count", Value::BigInt(12))])]);

    let first = model.get_count(popular(), CountOptions::new(), None, None).await.unwrap();
    let second = model.get_count(popular(), CountOptions::new(), None, None).await.unwrap();

    assert_eq!((first, second), (12, 12));
    assert_eq!(db.sql(), vec![r#"SELECT COUNT(*) FROM "items" WHERE "views" > $1"#.to_string()]);
    assert_eq!(db.acquired(), 1);

    let key = model.count_key(&popular(), &CountOptions::new()).unwrap();
    assert!(key.starts_with("count:"));
    assert_eq!(key.len(), "count:".len() + 64);
    assert_eq!(cache.keys(), vec![key.clone()]);
    let ttl = cache.ttl(&key).unwrap();
    assert!(ttl <= Duration::from_secs(180) && ttl > Duration::from_secs(170));
}

#[tokio::test]
async fn test_count_key_differs_by_bound_values() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);

    let a = model.count_key(&Lookup::all().matching("name", "a"), &CountOptions::new()).unwrap();
    let b = model.count_key(&Lookup::all().matching("name", "b"), &CountOptions::new()).unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_count_key_uses_app_prefix_and_postfix() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = shop_items(&db, &cache);
    db.rows(vec![row(&[("count", Value::BigInt(3))])]);

    let options = CountOptions::new().postfix("popular").expire(60);
    model.get_count(popular(), options.clone(), None, None).await.unwrap();

    assert_eq!(cache.keys(), vec!["shop:count:popular".to_string()]);
    assert_eq!(model.count_key(&popular(), &options).unwrap(), "shop:count:popular");
    assert!(cache.ttl("shop:count:popular").unwrap() <= Duration::from_secs(60));
}

#[tokio::test]
async fn test_count_uncached_always_queries() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);
    db.rows(vec![row(&[("count", Value::BigInt(1))])]);
    db.rows(vec![row(&[("count", Value::BigInt(2))])]);

    let first = model.get_count(Lookup::all(), CountOptions::uncached(), None, None).await.unwrap();
    let second = model.get_count(Lookup::all(), CountOptions::uncached(), None, None).await.unwrap();

    assert_eq!((first, second), (1, 2));
    assert!(cache.is_empty());
    assert_eq!(db.sql()[0], r#"SELECT COUNT(*) FROM "items""#);
}

#[tokio::test]
async fn test_count_with_caller_cache_and_session() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);
    db.rows(vec![row(&[("count", Value::BigInt(4))])]);

    let mut store = MemoryCache::new();
    let mut session = db.session();
    let n = model
        .get_count(popular(), CountOptions::new().postfix("p"), Some(session.as_session()), Some(store.as_cache()))
        .await
        .unwrap();

    assert_eq!(n, 4);
    assert_eq!(store.keys(), vec!["count:p".to_string()]);
    assert!(cache.is_empty());
    assert_eq!(db.acquired(), 0);
}

#[tokio::test]
async fn test_corrupt_cached_count_is_cache_error() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);
    let mut store = cache.clone();
    store.set("count:broken", "many").await.unwrap();

    let err = model
        .get_count(Lookup::all(), CountOptions::new().postfix("broken"), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, HybridError::Cache(_)));
    assert_eq!(db.acquired(), 0);
}

#[tokio::test]
async fn test_sum_of_no_rows_is_zero_and_not_cached() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);
    db.rows(vec![row(&[("sum", Value::Null)])]);

    let sum = model
        .get_sum("price", popular(), SumOptions::new().delay(30), None, None)
        .await
        .unwrap();

    assert_eq!(sum, Decimal::ZERO);
    assert!(cache.is_empty());
    assert_eq!(db.sql()[0], r#"SELECT SUM("price") FROM "items" WHERE "views" > $1"#);
}

#[tokio::test]
async fn test_sum_cached_only_with_delay() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = shop_items(&db, &cache);
    let total = Decimal::from_str("12.50").unwrap();
    db.rows(vec![row(&[("sum", Value::Decimal(total))])]);
    db.rows(vec![row(&[("sum", Value::Decimal(total))])]);

    let uncached = model.get_sum("price", Lookup::all(), SumOptions::new(), None, None).await.unwrap();
    assert_eq!(uncached, total);
    assert!(cache.is_empty());

    let options = SumOptions::new().postfix("all").delay(30);
    let first = model.get_sum("price", Lookup::all(), options.clone(), None, None).await.unwrap();
    let second = model.get_sum("price", Lookup::all(), options, None, None).await.unwrap();

    assert_eq!((first, second), (total, total));
    assert_eq!(cache.keys(), vec!["shop:aggregate:sum:all".to_string()]);
    assert_eq!(db.statements().len(), 2);
}

#[tokio::test]
async fn test_sum_of_unknown_column_is_rejected() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);

    let err = model
        .get_sum("weight", Lookup::all(), SumOptions::new(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, HybridError::Attribute(_)));
    assert_eq!(db.acquired(), 0);
}

#[tokio::test]
async fn test_integer_sum_converts_to_decimal() {
    let db = ScriptedDb::new();
    let cache = MemoryCache::new();
    let model = items(&db, &cache);
    db.rows(vec![row(&[("sum", Value::BigInt(42))])]);

    let sum = model.get_sum("views", Lookup::all(), SumOptions::new(), None, None).await.unwrap();
    assert_eq!(sum, Decimal::from(42));
}
