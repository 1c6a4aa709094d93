// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational schema.
//!
//! ```text
//! submodel ─┬─ submodel_semantic_id_{reference,reference_key,payload}
//!           └─ submodel_element ─┬─ submodel_element_payload        (common JSON fields)
//!                 ▲ parent/root  ├─ submodel_element_semantic_id_*  (snapshot + key rows)
//!                 └──────────────┴─ <variant>_element               (one side table per type)
//! ```
//!
//! JSON lives in TEXT/LONGTEXT columns (the sqlx `Any` driver has no JSON
//! type mapping). All child tables cascade on delete, so removing a submodel
//! row removes its whole subgraph. MySQL path columns use a binary collation
//! so that uniqueness and range scans are case- and byte-exact, matching SQLite.

use super::Dialect;

const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS submodel (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL UNIQUE,
    id_short TEXT,
    category TEXT,
    kind TEXT,
    administration_payload TEXT,
    description_payload TEXT NOT NULL,
    displayname_payload TEXT NOT NULL,
    qualifiers_payload TEXT NOT NULL,
    extensions_payload TEXT NOT NULL,
    embedded_data_specification_payload TEXT NOT NULL,
    supplemental_semantic_ids_payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS submodel_semantic_id_reference (
    owner_id INTEGER NOT NULL REFERENCES submodel(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    reference_type TEXT NOT NULL,
    PRIMARY KEY (owner_id, depth)
);
CREATE TABLE IF NOT EXISTS submodel_semantic_id_reference_key (
    owner_id INTEGER NOT NULL REFERENCES submodel(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    position INTEGER NOT NULL,
    key_type TEXT NOT NULL,
    key_value TEXT NOT NULL,
    PRIMARY KEY (owner_id, depth, position)
);
CREATE TABLE IF NOT EXISTS submodel_semantic_id_payload (
    owner_id INTEGER PRIMARY KEY REFERENCES submodel(id) ON DELETE CASCADE,
    snapshot TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS submodel_element (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submodel_id INTEGER NOT NULL REFERENCES submodel(id) ON DELETE CASCADE,
    parent_sme_id INTEGER REFERENCES submodel_element(id) ON DELETE CASCADE,
    root_sme_id INTEGER REFERENCES submodel_element(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    id_short TEXT,
    category TEXT,
    model_type INTEGER NOT NULL,
    idshort_path TEXT NOT NULL,
    UNIQUE (submodel_id, idshort_path)
);
CREATE INDEX IF NOT EXISTS idx_sme_parent ON submodel_element(parent_sme_id, position);
CREATE INDEX IF NOT EXISTS idx_sme_root ON submodel_element(submodel_id, root_sme_id);
CREATE TABLE IF NOT EXISTS submodel_element_payload (
    element_id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    description_payload TEXT NOT NULL,
    displayname_payload TEXT NOT NULL,
    administration_payload TEXT NOT NULL,
    embedded_data_specification_payload TEXT NOT NULL,
    supplemental_semantic_ids_payload TEXT NOT NULL,
    extensions_payload TEXT NOT NULL,
    qualifiers_payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS submodel_element_semantic_id_reference (
    owner_id INTEGER NOT NULL REFERENCES submodel_element(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    reference_type TEXT NOT NULL,
    PRIMARY KEY (owner_id, depth)
);
CREATE TABLE IF NOT EXISTS submodel_element_semantic_id_reference_key (
    owner_id INTEGER NOT NULL REFERENCES submodel_element(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL,
    position INTEGER NOT NULL,
    key_type TEXT NOT NULL,
    key_value TEXT NOT NULL,
    PRIMARY KEY (owner_id, depth, position)
);
CREATE TABLE IF NOT EXISTS submodel_element_semantic_id_payload (
    owner_id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    snapshot TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS property_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    value_type TEXT NOT NULL,
    value_text TEXT,
    value_numeric TEXT,
    value_boolean TEXT,
    value_time TEXT,
    value_date TEXT,
    value_datetime TEXT,
    value_id_payload TEXT
);
CREATE TABLE IF NOT EXISTS multilanguage_property_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    value_payload TEXT,
    value_id_payload TEXT
);
CREATE TABLE IF NOT EXISTS range_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    value_type TEXT NOT NULL,
    min_text TEXT,
    min_numeric TEXT,
    min_boolean TEXT,
    min_time TEXT,
    min_date TEXT,
    min_datetime TEXT,
    max_text TEXT,
    max_numeric TEXT,
    max_boolean TEXT,
    max_time TEXT,
    max_date TEXT,
    max_datetime TEXT
);
CREATE TABLE IF NOT EXISTS blob_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    content_type TEXT NOT NULL,
    value BLOB
);
CREATE TABLE IF NOT EXISTS file_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    content_type TEXT NOT NULL,
    value TEXT
);
CREATE TABLE IF NOT EXISTS reference_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    value_payload TEXT
);
CREATE TABLE IF NOT EXISTS relationship_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    first_payload TEXT NOT NULL,
    second_payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS operation_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    input_variables_payload TEXT,
    output_variables_payload TEXT,
    inoutput_variables_payload TEXT
);
CREATE TABLE IF NOT EXISTS entity_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    entity_type TEXT,
    global_asset_id TEXT,
    specific_asset_ids_payload TEXT
);
CREATE TABLE IF NOT EXISTS basic_event_element (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    observed_payload TEXT NOT NULL,
    direction TEXT NOT NULL,
    state TEXT NOT NULL,
    message_topic TEXT,
    message_broker_payload TEXT,
    last_update TEXT,
    min_interval TEXT,
    max_interval TEXT
);
CREATE TABLE IF NOT EXISTS submodel_element_list (
    id INTEGER PRIMARY KEY REFERENCES submodel_element(id) ON DELETE CASCADE,
    order_relevant INTEGER,
    semantic_id_list_element_payload TEXT,
    type_value_list_element TEXT NOT NULL,
    value_type_list_element TEXT
)
"#;

const MYSQL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS submodel (
    id BIGINT AUTO_INCREMENT PRIMARY KEY,
    identifier VARCHAR(512) COLLATE utf8mb4_bin NOT NULL,
    id_short VARCHAR(255),
    category VARCHAR(255),
    kind VARCHAR(32),
    administration_payload LONGTEXT,
    description_payload LONGTEXT NOT NULL,
    displayname_payload LONGTEXT NOT NULL,
    qualifiers_payload LONGTEXT NOT NULL,
    extensions_payload LONGTEXT NOT NULL,
    embedded_data_specification_payload LONGTEXT NOT NULL,
    supplemental_semantic_ids_payload LONGTEXT NOT NULL,
    UNIQUE KEY uq_submodel_identifier (identifier)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_semantic_id_reference (
    owner_id BIGINT NOT NULL,
    depth BIGINT NOT NULL,
    reference_type VARCHAR(64) NOT NULL,
    PRIMARY KEY (owner_id, depth),
    FOREIGN KEY (owner_id) REFERENCES submodel(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_semantic_id_reference_key (
    owner_id BIGINT NOT NULL,
    depth BIGINT NOT NULL,
    position BIGINT NOT NULL,
    key_type VARCHAR(64) NOT NULL,
    key_value TEXT NOT NULL,
    PRIMARY KEY (owner_id, depth, position),
    FOREIGN KEY (owner_id) REFERENCES submodel(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_semantic_id_payload (
    owner_id BIGINT PRIMARY KEY,
    snapshot LONGTEXT NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES submodel(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_element (
    id BIGINT AUTO_INCREMENT PRIMARY KEY,
    submodel_id BIGINT NOT NULL,
    parent_sme_id BIGINT NULL,
    root_sme_id BIGINT NULL,
    position BIGINT NOT NULL,
    id_short VARCHAR(255),
    category VARCHAR(255),
    model_type BIGINT NOT NULL,
    idshort_path VARCHAR(700) COLLATE utf8mb4_bin NOT NULL,
    UNIQUE KEY uq_sme_path (submodel_id, idshort_path),
    INDEX idx_sme_parent (parent_sme_id, position),
    INDEX idx_sme_root (submodel_id, root_sme_id),
    FOREIGN KEY (submodel_id) REFERENCES submodel(id) ON DELETE CASCADE,
    FOREIGN KEY (parent_sme_id) REFERENCES submodel_element(id) ON DELETE CASCADE,
    FOREIGN KEY (root_sme_id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_element_payload (
    element_id BIGINT PRIMARY KEY,
    description_payload LONGTEXT NOT NULL,
    displayname_payload LONGTEXT NOT NULL,
    administration_payload LONGTEXT NOT NULL,
    embedded_data_specification_payload LONGTEXT NOT NULL,
    supplemental_semantic_ids_payload LONGTEXT NOT NULL,
    extensions_payload LONGTEXT NOT NULL,
    qualifiers_payload LONGTEXT NOT NULL,
    FOREIGN KEY (element_id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_element_semantic_id_reference (
    owner_id BIGINT NOT NULL,
    depth BIGINT NOT NULL,
    reference_type VARCHAR(64) NOT NULL,
    PRIMARY KEY (owner_id, depth),
    FOREIGN KEY (owner_id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_element_semantic_id_reference_key (
    owner_id BIGINT NOT NULL,
    depth BIGINT NOT NULL,
    position BIGINT NOT NULL,
    key_type VARCHAR(64) NOT NULL,
    key_value TEXT NOT NULL,
    PRIMARY KEY (owner_id, depth, position),
    FOREIGN KEY (owner_id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_element_semantic_id_payload (
    owner_id BIGINT PRIMARY KEY,
    snapshot LONGTEXT NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS property_element (
    id BIGINT PRIMARY KEY,
    value_type VARCHAR(64) NOT NULL,
    value_text LONGTEXT,
    value_numeric VARCHAR(255),
    value_boolean VARCHAR(8),
    value_time VARCHAR(64),
    value_date VARCHAR(64),
    value_datetime VARCHAR(64),
    value_id_payload LONGTEXT,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS multilanguage_property_element (
    id BIGINT PRIMARY KEY,
    value_payload LONGTEXT,
    value_id_payload LONGTEXT,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS range_element (
    id BIGINT PRIMARY KEY,
    value_type VARCHAR(64) NOT NULL,
    min_text LONGTEXT,
    min_numeric VARCHAR(255),
    min_boolean VARCHAR(8),
    min_time VARCHAR(64),
    min_date VARCHAR(64),
    min_datetime VARCHAR(64),
    max_text LONGTEXT,
    max_numeric VARCHAR(255),
    max_boolean VARCHAR(8),
    max_time VARCHAR(64),
    max_date VARCHAR(64),
    max_datetime VARCHAR(64),
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS blob_element (
    id BIGINT PRIMARY KEY,
    content_type VARCHAR(255) NOT NULL,
    value LONGBLOB,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS file_element (
    id BIGINT PRIMARY KEY,
    content_type VARCHAR(255) NOT NULL,
    value TEXT,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS reference_element (
    id BIGINT PRIMARY KEY,
    value_payload LONGTEXT,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS relationship_element (
    id BIGINT PRIMARY KEY,
    first_payload LONGTEXT NOT NULL,
    second_payload LONGTEXT NOT NULL,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS operation_element (
    id BIGINT PRIMARY KEY,
    input_variables_payload LONGTEXT,
    output_variables_payload LONGTEXT,
    inoutput_variables_payload LONGTEXT,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS entity_element (
    id BIGINT PRIMARY KEY,
    entity_type VARCHAR(32),
    global_asset_id TEXT,
    specific_asset_ids_payload LONGTEXT,
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS basic_event_element (
    id BIGINT PRIMARY KEY,
    observed_payload LONGTEXT NOT NULL,
    direction VARCHAR(16) NOT NULL,
    state VARCHAR(16) NOT NULL,
    message_topic TEXT,
    message_broker_payload LONGTEXT,
    last_update VARCHAR(64),
    min_interval VARCHAR(64),
    max_interval VARCHAR(64),
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
CREATE TABLE IF NOT EXISTS submodel_element_list (
    id BIGINT PRIMARY KEY,
    order_relevant BIGINT,
    semantic_id_list_element_payload LONGTEXT,
    type_value_list_element VARCHAR(64) NOT NULL,
    value_type_list_element VARCHAR(64),
    FOREIGN KEY (id) REFERENCES submodel_element(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
"#;

/// DDL statements for a dialect, in creation order.
pub fn statements(dialect: Dialect) -> Vec<&'static str> {
    let script = match dialect {
        Dialect::Sqlite => SQLITE_SCHEMA,
        Dialect::MySql => MYSQL_SCHEMA,
    };
    script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
