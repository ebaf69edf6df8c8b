//! Tests for the statement builder.

use super::*;
use crate::Value;
use serde_json::json;

    #[test]
    fn test_simple_select() {
        let stmt = Select::new("users").unwrap().build().unwrap();
        assert_eq!(stmt.sql, "SELECT \"users\".* FROM \"users\"");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_with_columns() {
        let stmt = Select::new("users").unwrap()
            .columns(["id", "name"]).unwrap()
            .build().unwrap();
        assert_eq!(stmt.sql, "SELECT \"users\".\"id\", \"users\".\"name\" FROM \"users\"");
    }

    #[test]
    fn test_select_with_multiple_where() {
        let stmt = Select::new("users").unwrap()
            .filter(Predicate::gt("age", 18))
            .filter(Predicate::eq("status", "active"))
            .build().unwrap();
        assert_eq!(stmt.sql, "SELECT \"users\".* FROM \"users\" WHERE \"age\" > $1 AND \"status\" = $2");
        assert_eq!(stmt.params, vec![Value::Int(18), Value::from("active")]);
    }

    #[test]
    fn test_select_order_limit_offset() {
        let stmt = Select::new("users").unwrap()
            .order_by(OrderBy::parse("name").unwrap())
            .order_by(OrderBy::parse("-created").unwrap())
            .limit(10)
            .offset(20)
            .build().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".* FROM \"users\" ORDER BY \"name\" ASC, \"created\" DESC LIMIT $1 OFFSET $2"
        );
        assert_eq!(stmt.params, vec![Value::BigInt(10), Value::BigInt(20)]);
    }

    #[test]
    fn test_select_with_join() {
        let stmt = Select::new("orders").unwrap()
            .join(Join::inner("customers", "orders.customer_id", "customers.id").unwrap())
            .filter(Predicate::eq("customers.country", "NL"))
            .build().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"orders\".* FROM \"orders\" INNER JOIN \"customers\" ON \"orders\".\"customer_id\" = \"customers\".\"id\" WHERE \"customers\".\"country\" = $1"
        );
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(OrderBy::parse("name").unwrap().direction, OrderDirection::Asc);
        assert_eq!(OrderBy::parse("name DESC").unwrap().direction, OrderDirection::Desc);
        assert_eq!(OrderBy::parse(" -name ").unwrap().column, "name");
        assert!(OrderBy::parse("name sideways").is_err());
        assert!(OrderBy::parse("name; drop").is_err());
        assert!(OrderBy::parse("").is_err());
    }

    #[test]
    fn test_count_and_sum() {
        let select = Select::new("payments").unwrap().filter(Predicate::eq("user_id", 3));
        assert_eq!(
            select.build_count().unwrap().sql,
            "SELECT COUNT(*) FROM \"payments\" WHERE \"user_id\" = $1"
        );
        assert_eq!(
            select.build_sum("amount").unwrap().sql,
            "SELECT SUM(\"amount\") FROM \"payments\" WHERE \"user_id\" = $1"
        );
    }

    #[test]
    fn test_predicate_null_comparison() {
        let stmt = Select::new("users").unwrap()
            .filter(Predicate::eq("deleted_at", Value::Null))
            .filter(Predicate::ne("email", Value::Null))
            .build().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"users\".* FROM \"users\" WHERE \"deleted_at\" IS NULL AND \"email\" IS NOT NULL"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_predicate_in() {
        let stmt = Select::new("tags").unwrap()
            .filter(Predicate::is_in("id", vec![1i32, 2, 3]))
            .build().unwrap();
        assert_eq!(stmt.sql, "SELECT \"tags\".* FROM \"tags\" WHERE \"id\" = ANY($1)");
        assert_eq!(
            stmt.params,
            vec![Value::Array(vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)])]
        );
    }

    #[test]
    fn test_predicate_in_empty_matches_nothing() {
        let stmt = Select::new("tags").unwrap()
            .filter(Predicate::is_in("id", Vec::<i64>::new()))
            .build().unwrap();
        assert_eq!(stmt.sql, "SELECT \"tags\".* FROM \"tags\" WHERE FALSE");
    }

    #[test]
    fn test_predicate_or_not() {
        let p = Predicate::eq("a", 1).or(Predicate::eq("b", 2)).not();
        let stmt = Select::new("t").unwrap().filter(p).build().unwrap();
        assert_eq!(stmt.sql, "SELECT \"t\".* FROM \"t\" WHERE NOT ((\"a\" = $1 OR \"b\" = $2))");
    }

    #[test]
    fn test_raw_predicate_renumbered() {
        let stmt = Select::new("t").unwrap()
            .filter(Predicate::eq("a", 1))
            .filter(Predicate::raw("lower(\"name\") = $1", vec![Value::from("x")]))
            .build().unwrap();
        assert_eq!(stmt.sql, "SELECT \"t\".* FROM \"t\" WHERE \"a\" = $1 AND (lower(\"name\") = $2)");
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_insert_returning() {
        let stmt = Insert::new("users").unwrap()
            .values(vec![("name", Value::from("Alice")), ("bio", Value::Null)]).unwrap()
            .returning("id").unwrap()
            .build().unwrap();
        assert_eq!(stmt.sql, "INSERT INTO \"users\" (\"name\", \"bio\") VALUES ($1, NULL) RETURNING \"id\"");
        assert_eq!(stmt.params, vec![Value::from("Alice")]);
    }

    #[test]
    fn test_insert_default_values() {
        let stmt = Insert::new("users").unwrap().returning("id").unwrap().build().unwrap();
        assert_eq!(stmt.sql, "INSERT INTO \"users\" DEFAULT VALUES RETURNING \"id\"");
    }

    #[test]
    fn test_update_assignments() {
        let stmt = Update::new("items").unwrap()
            .set("name", "lamp").unwrap()
            .increment("views", 5).unwrap()
            .json_merge("meta", json!({"color": "red"})).unwrap()
            .filter(Predicate::eq("id", 7))
            .returning("id").unwrap()
            .build().unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"items\" SET \"name\" = $1, \"views\" = \"views\" + $2, \"meta\" = COALESCE(\"meta\", '{}'::jsonb) || $3::jsonb WHERE \"id\" = $4 RETURNING \"id\""
        );
        assert_eq!(stmt.params.len(), 4);
    }

    #[test]
    fn test_update_returning_several_columns() {
        let stmt = Update::new("items").unwrap()
            .increment("views", 1).unwrap()
            .filter(Predicate::eq("id", 7))
            .returning("id").unwrap()
            .returning("views").unwrap()
            .build().unwrap();
        assert!(stmt.sql.ends_with("RETURNING \"id\", \"views\""));
    }

    #[test]
    fn test_update_without_values_fails() {
        let result = Update::new("items").unwrap().filter(Predicate::eq("id", 1)).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_delete() {
        let stmt = Delete::new("links").unwrap()
            .filter(Predicate::is_in("post_id", vec![1i64, 2]))
            .build().unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"links\" WHERE \"post_id\" = ANY($1)");
    }

    #[test]
    fn test_literal_sql() {
        let stmt = Select::new("users").unwrap()
            .filter(Predicate::eq("name", "O'Brien"))
            .filter(Predicate::gt("age", 30))
            .build().unwrap();
        assert_eq!(
            stmt.to_literal_sql(),
            "SELECT \"users\".* FROM \"users\" WHERE \"name\" = 'O''Brien' AND \"age\" > 30"
        );
    }

    #[test]
    fn test_literal_sql_keeps_quoted_dollars() {
        let stmt = Statement::new("SELECT '$1' || $1", vec![Value::from("x")]);
        assert_eq!(stmt.to_literal_sql(), "SELECT '$1' || 'x'");
    }

    #[test]
    fn test_literal_sql_two_digit_placeholders() {
        let params: Vec<Value> = (1..=11).map(Value::Int).collect();
        let sql = (1..=11).map(|i| format!("${}", i)).collect::<Vec<_>>().join(",");
        let stmt = Statement::new(sql, params);
        assert_eq!(stmt.to_literal_sql(), "1,2,3,4,5,6,7,8,9,10,11");
    }

    #[test]
    fn test_digest_is_stable_and_value_sensitive() {
        let a = Select::new("users").unwrap().filter(Predicate::eq("id", 1)).build_count().unwrap();
        let b = Select::new("users").unwrap().filter(Predicate::eq("id", 1)).build_count().unwrap();
        let c = Select::new("users").unwrap().filter(Predicate::eq("id", 2)).build_count().unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("public.users").is_ok());
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("pg_authid").is_err());
        assert!(validate_identifier("select").is_err());
        assert!(validate_identifier("name\"; --").is_err());
        assert!(validate_identifier(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_adjust_param_indices() {
        assert_eq!(adjust_param_indices("a = $1 AND b = $2", 3), "a = $4 AND b = $5");
        assert_eq!(adjust_param_indices("a = $1", 0), "a = $1");
    }
