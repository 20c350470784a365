// https://dev.mysql.com/doc/c-api/8.0/en/mysql-info.html
// https://mariadb.com/kb/en/mysql_info/

/// Counters the server reports in the human-readable info string of an OK packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Info {
    pub(crate) records: Option<u64>,
    pub(crate) duplicates: Option<u64>,
    pub(crate) matched: Option<u64>,
    pub(crate) changed: Option<u64>,
}

impl Info {
    pub(crate) fn parse(info: &str) -> Self {
        let mut parsed = Info::default();

        if info.is_empty() {
            return parsed;
        }

        let mut failed = false;

        for item in info.split("  ") {
            let Some((key, value)) = item.split_once(": ") else {
                failed = true;
                continue;
            };

            let Ok(value) = value.trim().parse::<u64>() else {
                failed = true;
                continue;
            };

            match key.trim() {
                "Records" => parsed.records = Some(value),
                "Duplicates" => parsed.duplicates = Some(value),
                "Rows matched" => parsed.matched = Some(value),
                "Changed" => parsed.changed = Some(value),

                // warnings are reported in their own field
                "Warnings" | "Skipped" | "Deleted" => {}

                _ => failed = true,
            }
        }

        if failed {
            tracing::debug!(
                target: "mywire::protocol",
                info,
                "unrecognized status information in OK packet"
            );
        }

        parsed
    }
}
