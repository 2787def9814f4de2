pub const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS "users" (
        "id"            INTEGER NOT NULL UNIQUE,
        "balance"       REAL NOT NULL DEFAULT 0,
        PRIMARY KEY("id")
    );
    CREATE TABLE IF NOT EXISTS "deposits" (
        "id"            INTEGER NOT NULL UNIQUE,
        "userId"        INTEGER NOT NULL,
        "balanceBefore" REAL NOT NULL,
        "balanceAfter"  REAL NOT NULL,
        "date"          INTEGER NOT NULL,
        PRIMARY KEY("id")
    );
    CREATE TABLE IF NOT EXISTS "transactions" (
        "id"            INTEGER NOT NULL UNIQUE,
        "userId"        INTEGER NOT NULL,
        "type"          TEXT NOT NULL,
        "amount"        REAL NOT NULL,
        "balanceBefore" REAL NOT NULL,
        "balanceAfter"  REAL NOT NULL,
        "date"          INTEGER NOT NULL,
        PRIMARY KEY("id")
    );
"#;

pub const CREATE_INDEXES: &str = r#"
    CREATE INDEX IF NOT EXISTS "transactionUserId" ON "transactions" ("userId" ASC);
    CREATE INDEX IF NOT EXISTS "depositUserId" ON "deposits" ("userId" ASC);
"#;

pub(super) const INSERT_USER: &str = r#"INSERT INTO "users" ("id", "balance") VALUES (?1, ?2)"#;

pub(super) const INSERT_DEPOSIT: &str = r#"
    INSERT INTO "deposits" ("id", "userId", "balanceBefore", "balanceAfter", "date")
    VALUES (?1, ?2, ?3, ?4, ?5)
"#;

pub(super) const INSERT_TRANSACTION: &str = r#"
    INSERT INTO "transactions" ("id", "userId", "type", "amount", "balanceBefore", "balanceAfter", "date")
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#;

pub(super) const UPDATE_BALANCE: &str = r#"UPDATE "users" SET "balance" = ?1 WHERE "id" = ?2"#;

pub(super) const SELECT_USERS: &str = r#"SELECT "id", "balance" FROM "users""#;

// Rows are replayed in id order with the same f64 additions the cache performs.
pub(super) const SELECT_DEPOSITS: &str = r#"
    SELECT "userId", "balanceBefore", "balanceAfter"
    FROM "deposits"
    ORDER BY "id"
"#;

pub(super) const SELECT_TRANSACTIONS: &str = r#"
    SELECT "userId", "type", "amount"
    FROM "transactions"
    ORDER BY "id"
"#;
