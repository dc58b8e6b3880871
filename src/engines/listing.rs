//! Parsers for textual archive listings.
//!
//! Listing an archive goes through an external tool, and each tool prints
//! members in its own format. These parsers turn the captured stdout into
//! an ordered list of plain-file member paths, directories excluded.

/// Parse `tar -tzf` output: one member per line, directories carry a
/// trailing slash. Leading `./` segments are stripped.
pub fn parse_tar_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .map(|line| line.strip_prefix("./").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `7z l` table output. Member rows sit between the two dashed
/// rules; the attribute column marks directories with `D`, and the name
/// column offset comes from the header row.
pub fn parse_7z_listing(output: &str) -> Vec<String> {
    let name_start = output
        .lines()
        .find(|line| line.contains("Attr") && line.contains("Name"))
        .and_then(|header| header.find("Name"));
    let Some(name_start) = name_start else {
        return Vec::new();
    };

    let mut files = Vec::new();
    let mut in_table = false;
    for line in output.lines() {
        if line.trim_start().starts_with("----") {
            in_table = !in_table;
            continue;
        }
        if !in_table {
            continue;
        }
        let Some(name) = line.get(name_start..).map(str::trim) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let attrs = line.get(..name_start).unwrap_or("");
        if attrs.contains('D') {
            continue;
        }
        files.push(name.strip_prefix("./").unwrap_or(name).to_string());
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tar_listing_keeps_order_and_drops_directories() {
        let output = "bin/\nbin/bar.sh\nlib/\nlib/baz.so\netc/\netc/qux.conf\n";
        assert_eq!(
            parse_tar_listing(output),
            vec!["bin/bar.sh", "lib/baz.so", "etc/qux.conf"]
        );
    }

    #[test]
    fn tar_listing_strips_dot_slash_members() {
        let output = "./\n./bin/\n./bin/tool\n";
        assert_eq!(parse_tar_listing(output), vec!["bin/tool"]);
    }

    #[test]
    fn tar_listing_of_empty_output_is_empty() {
        assert!(parse_tar_listing("").is_empty());
    }

    #[test]
    fn seven_zip_listing_extracts_file_rows() {
        let output = "\
7-Zip [64] 16.02 : Copyright (c) 1999-2016 Igor Pavlov : 2016-05-21

Listing archive:

   Date      Time    Attr         Size   Compressed  Name
------------------- ----- ------------ ------------  ------------------------
2024-01-01 10:00:00 D....            0            0  bin
2024-01-01 10:00:00 ....A           21           21  bin/bar.sh
2024-01-01 10:00:01 D....            0            0  lib
2024-01-01 10:00:01 ....A         1024         1024  lib/baz.so
2024-01-01 10:00:02 ....A           64           64  etc/qux.conf
------------------- ----- ------------ ------------  ------------------------
2024-01-01 10:00:02           1109         1109  3 files, 2 folders
";
        assert_eq!(
            parse_7z_listing(output),
            vec!["bin/bar.sh", "lib/baz.so", "etc/qux.conf"]
        );
    }

    #[test]
    fn seven_zip_listing_without_table_is_empty() {
        assert!(parse_7z_listing("garbage\nno table here\n").is_empty());
    }
}
