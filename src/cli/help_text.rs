pub(super) const ROOT_LONG_ABOUT: &str = "\
Apply or roll back manifest-driven file upgrades of a WAF install

Wafup moves files between three trees according to a YAML manifest:

  staging tree  (default upgrade/)  new files shipped with the upgrade
  live tree     (default /waf/)     the deployed install
  backup tree   (default bak/)      files displaced by the upgrade

Every path is the root followed directly by the record's relative_path, so
roots are expected to end in a slash.

MANIFEST FORMAT:

  A YAML sequence of mappings, one per file:

    - relative_path: conf/app.conf
      action: modify
      chmod: \"644\"
    - relative_path: lib/old.so
      action: delete
    - relative_path: bin/new-tool
      waf_base: /opt/waf/
      action: add

  relative_path  required, must not be absolute or contain '..'
  action         add, delete or modify (exact, lowercase); anything else
                 makes the record inert
  waf_base       replaces the live root for this record
  chmod          decimal mode, recorded but not applied

TASKS:

  check
    Decode the manifest and resolve every path. Prints 'ok <path>' for
    each valid record. No file is touched.

  upgrade
    For delete and modify, move the live file into the backup tree.
    For add and modify, copy the staged file over the live one.

  rollback
    For add and modify, remove what the upgrade copied in. For a
    directory only the entries present in the staging tree are removed.
    For delete and modify, move the backup back into the live tree.
    Directories left empty by this are removed.

A record that fails is logged and the remaining records are still
processed.";

pub(super) const ROOT_AFTER_HELP: &str = "\
EXIT STATUS:
  0    all records processed successfully
  1    the run completed but at least one record failed
  2    invalid command line
  255  unreadable config or manifest, malformed manifest, unknown task

CONFIG FILE (--config):
  staging_root = \"upgrade/\"
  live_root = \"/waf/\"
  backup_root = \"bak/\"
  max_path_length = 256
  max_record_count = 128
  overflow = \"reject\"      # or \"truncate\"
  dir_mode = 0o751";
